use faceid_core::capability::{DescriptorExtractor, FaceDetector};
use faceid_core::controller::{Command, Controller, Outcome};
use faceid_core::error::PipelineError;
use faceid_core::types::Frame;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const ENGINE_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// One frame to run through the controller.
struct CycleRequest {
    frame: Frame,
    command: Command,
    reply: oneshot::Sender<Result<Outcome, PipelineError>>,
}

/// Clone-safe handle to one stream's engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<CycleRequest>,
}

impl EngineHandle {
    /// Queue a cycle and wait for its outcome.
    ///
    /// Dropping the returned future abandons the reply only; a registration
    /// already taken off the queue still completes its write.
    pub async fn cycle(&self, frame: Frame, command: Command) -> Result<Outcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CycleRequest {
                frame,
                command,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        let outcome = reply_rx.await.map_err(|_| EngineError::ChannelClosed)??;
        Ok(outcome)
    }
}

/// Move `controller` onto a dedicated OS thread and return its handle.
///
/// Inference is blocking, so it never runs on the async runtime. The thread
/// exits once every handle has been dropped.
pub fn spawn_engine<D, E>(mut controller: Controller<D, E>, name: &str) -> Result<EngineHandle, EngineError>
where
    D: FaceDetector + 'static,
    E: DescriptorExtractor + 'static,
{
    let (tx, mut rx) = mpsc::channel::<CycleRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                let result = controller.cycle(&req.frame, req.command);
                if req.reply.send(result).is_err() {
                    tracing::debug!(command = ?req.command, "caller went away before the outcome arrived");
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
