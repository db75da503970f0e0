//! 发现结果的增量推送

use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::discovery::types::{DiscoveryEvent, DiscoveryReport, DiscoverySummary};
use crate::error::DiscoveryError;

/// 事件发送端
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl EventSink {
    /// 推送一个事件，调用方不再接收时静默丢弃
    pub fn emit(&self, event: DiscoveryEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!("📭 事件接收端已关闭，丢弃事件");
        }
    }
}

pin_project! {
    /// 发现事件流，运行结束后自动关闭
    pub struct FigureStream {
        #[pin]
        receiver: mpsc::UnboundedReceiver<DiscoveryEvent>,
        figures_seen: usize,
        complete: bool,
    }
}

impl FigureStream {
    /// 创建发送端与事件流
    pub fn channel() -> (EventSink, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            EventSink { sender },
            Self {
                receiver,
                figures_seen: 0,
                complete: false,
            },
        )
    }

    /// 已收到的人物档案数
    pub fn figures_seen(&self) -> usize {
        self.figures_seen
    }

    /// 是否已收到结束事件
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl Stream for FigureStream {
    type Item = DiscoveryEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        match this.receiver.as_mut().get_mut().poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                match &event {
                    DiscoveryEvent::Figure(_) => *this.figures_seen += 1,
                    DiscoveryEvent::Finished(_) | DiscoveryEvent::Failed { .. } => {
                        *this.complete = true
                    }
                    _ => {}
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                *this.complete = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// 一次进行中的发现运行
pub struct DiscoveryRun {
    pub events: FigureStream,
    handle: JoinHandle<Result<DiscoverySummary, DiscoveryError>>,
    cancel: CancellationToken,
}

impl DiscoveryRun {
    pub(crate) fn new(
        events: FigureStream,
        handle: JoinHandle<Result<DiscoverySummary, DiscoveryError>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            events,
            handle,
            cancel,
        }
    }

    /// 取消本次运行，进行中的调研任务会被中止
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 等待运行结束（不消费事件）
    pub async fn wait(self) -> Result<DiscoverySummary, DiscoveryError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(DiscoveryError::Cancelled),
            Err(e) => Err(DiscoveryError::Config(format!("发现任务异常退出: {}", e))),
        }
    }

    /// 收集所有事件并等待运行结束
    pub async fn collect(mut self) -> (DiscoveryReport, Result<DiscoverySummary, DiscoveryError>) {
        let mut report = DiscoveryReport::default();
        while let Some(event) = self.events.next().await {
            report.absorb(event);
        }
        let result = self.wait().await;
        (report, result)
    }
}
