use async_trait::async_trait;
use ragchat_types::StreamFrame;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Output sink is closed")]
pub struct SinkClosed;

/// Caller-facing transport for stream frames
#[async_trait]
pub trait OutputSink: Send {
    async fn send(&mut self, frame: StreamFrame) -> Result<(), SinkClosed>;
}

/// Sink feeding a bounded channel, drained by the HTTP response
pub struct ChannelSink {
    tx: mpsc::Sender<StreamFrame>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StreamFrame>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn send(&mut self, frame: StreamFrame) -> Result<(), SinkClosed> {
        self.tx.send(frame).await.map_err(|_| SinkClosed)
    }
}

/// Collects frames in memory
#[async_trait]
impl OutputSink for Vec<StreamFrame> {
    async fn send(&mut self, frame: StreamFrame) -> Result<(), SinkClosed> {
        self.push(frame);
        Ok(())
    }
}
