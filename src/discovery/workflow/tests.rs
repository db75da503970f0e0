#[cfg(test)]
mod tests {
    use crate::discovery::workflow::{TimingKeys, TimingScope};
    use std::time::Duration;

    #[test]
    fn test_end_phase_without_start_returns_none() {
        let mut timing = TimingScope::new();
        assert!(timing.end_phase(TimingKeys::SEARCH).is_none());
        assert!(timing.get_phase_durations().is_empty());
    }

    #[test]
    fn test_phases_keep_completion_order() {
        let mut timing = TimingScope::new();

        timing.start_phase(TimingKeys::EXTRACT);
        timing.end_phase(TimingKeys::EXTRACT);
        timing.start_phase(TimingKeys::SAMPLE);
        timing.end_phase(TimingKeys::SAMPLE);

        let phases: Vec<&str> = timing
            .get_phase_durations()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(phases, vec![TimingKeys::EXTRACT, TimingKeys::SAMPLE]);
    }

    #[test]
    fn test_repeated_phase_accumulates() {
        let mut timing = TimingScope::new();

        timing.start_phase(TimingKeys::RESEARCH);
        std::thread::sleep(Duration::from_millis(5));
        let first = timing.end_phase(TimingKeys::RESEARCH).unwrap();

        timing.start_phase(TimingKeys::RESEARCH);
        std::thread::sleep(Duration::from_millis(5));
        let second = timing.end_phase(TimingKeys::RESEARCH).unwrap();

        let total = timing.phase_duration(TimingKeys::RESEARCH).unwrap();
        assert_eq!(total, first + second);
        assert_eq!(timing.get_phase_durations().len(), 1);
    }

    #[test]
    fn test_timing_report_lists_phases() {
        let mut timing = TimingScope::new();
        timing.start_phase(TimingKeys::PERSIST);
        timing.end_phase(TimingKeys::PERSIST);

        let report = timing.generate_timing_report();
        assert!(report.starts_with("总执行时间"));
        assert!(report.contains("- persist:"));
    }

    #[test]
    fn test_all_phase_keys_are_unique() {
        let keys = TimingKeys::get_all_phase_keys();
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(keys.len(), unique.len());
    }
}
