use futures::StreamExt;
use std::future::Future;

/// 以给定并发上限执行一组future，结果按输入顺序返回
pub async fn do_parallel_with_limit<F, T>(futures: Vec<F>, max_concurrent: usize) -> Vec<T>
where
    F: Future<Output = T>,
{
    futures::stream::iter(futures)
        .buffered(max_concurrent.max(1))
        .collect()
        .await
}
