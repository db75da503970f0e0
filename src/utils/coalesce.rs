//! 请求合并 - 相同键的并发请求共享同一个进行中的任务

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::sync::Arc;

type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, Arc<E>>>>;

pub struct RequestCoalescer<T, E> {
    pending: DashMap<String, SharedResult<T, E>>,
}

impl<T, E> Default for RequestCoalescer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> RequestCoalescer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// 执行或加入键为 `key` 的请求
    ///
    /// 已有相同键的请求在进行时不会调用 `make`，而是等待该请求的结果。
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> Result<T, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shared = match self.pending.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!("🔗 合并进行中的请求: {}", key);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let future = make().map(|result| result.map_err(Arc::new)).boxed().shared();
                entry.insert(future.clone());
                future
            }
        };

        let result = shared.clone().await;
        self.pending
            .remove_if(key, |_, pending| pending.ptr_eq(&shared));
        result
    }
}
