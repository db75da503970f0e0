use dashmap::DashSet;

use crate::utils::names::normalize_name;

/// 单次发现运行内的人名认领表
///
/// 认领在整个运行期间有效，同一个人名在一次运行中只会被调研一次。
#[derive(Debug, Default)]
pub struct ClaimTable {
    claimed: DashSet<String>,
}

impl ClaimTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子地认领一个人名，已被认领时返回false
    pub fn try_claim(&self, name: &str) -> bool {
        self.claimed.insert(normalize_name(name))
    }

    /// 已认领的人名数
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_claim_is_case_insensitive() {
        let claims = ClaimTable::new();
        assert!(claims.try_claim("Ellen Ochoa"));
        assert!(!claims.try_claim("ellen  ochoa"));
        assert!(!claims.try_claim("ELLEN OCHOA"));
        assert_eq!(claims.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_single_winner() {
        let claims = Arc::new(ClaimTable::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let claims = claims.clone();
            handles.push(tokio::spawn(async move { claims.try_claim("Mario Molina") }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
