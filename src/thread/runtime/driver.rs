use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::ThreadError;
use crate::thread::domain::record::{NodeId, ReplyRecord};
use crate::thread::domain::visibility::RenderModel;
use crate::thread::mutator::{self, LikeOutcome};
use crate::thread::runtime::orchestrator::ThreadSession;
use crate::thread::store::RecordStore;

const REQUEST_BUFFER: usize = 64;

type Respond<T> = oneshot::Sender<Result<T, ThreadError>>;

#[derive(Debug)]
enum ViewAction {
    ToggleExpand(NodeId),
    ToggleCollapse(NodeId),
    Focus(NodeId),
    Unfocus,
    SetDraftTarget(Option<NodeId>),
}

#[derive(Debug)]
enum SessionRequest {
    Render { root: NodeId, respond: Respond<RenderModel> },
    Roots { respond: Respond<Vec<NodeId>> },
    Reply { parent: Option<NodeId>, content: String, respond: Respond<ReplyRecord> },
    Like { reply_id: NodeId, respond: Respond<LikeOutcome> },
    View { action: ViewAction, respond: Respond<()> },
    Close { respond: oneshot::Sender<()> },
}

/// A store write that finished while the session kept serving requests.
enum Completion {
    Reply { result: Result<ReplyRecord, ThreadError>, respond: Respond<ReplyRecord> },
    Like { result: Result<LikeOutcome, ThreadError>, respond: Respond<LikeOutcome> },
}

/// Runs a [`ThreadSession`] on its own task.
///
/// Store writes are spawned, so renders and view actions keep being served
/// while a reply or like is in flight. Closing the session (or dropping every
/// handle) stops the loop; writes still in flight then complete in the store
/// but their callers get [`ThreadError::Closed`] and the view is left untouched.
pub struct SessionDriver<S: RecordStore + 'static> {
    session: ThreadSession<S>,
    requests: mpsc::Receiver<SessionRequest>,
    completions: mpsc::UnboundedReceiver<Completion>,
    completion_tx: mpsc::UnboundedSender<Completion>,
}

impl<S: RecordStore + 'static> SessionDriver<S> {
    pub fn spawn(session: ThreadSession<S>) -> (SessionHandle, JoinHandle<()>) {
        let (tx, requests) = mpsc::channel(REQUEST_BUFFER);
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let driver = Self {
            session,
            requests,
            completions,
            completion_tx,
        };
        let task = tokio::spawn(driver.run());
        (SessionHandle { tx }, task)
    }

    async fn run(mut self) {
        log::info!("[DRIVER] serving {}", self.session.scope());

        loop {
            tokio::select! {
                update = self.session.next_update() => {
                    if let Some(update) = update {
                        self.session.enqueue(update);
                    }
                }
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        log::debug!("[DRIVER] all handles dropped");
                        break;
                    };
                    match request {
                        SessionRequest::Close { respond } => {
                            self.session.close();
                            let _ = respond.send(());
                            break;
                        }
                        other => self.handle_request(other),
                    }
                }
                Some(done) = self.completions.recv() => {
                    self.on_completion(done);
                }
            }
        }

        self.session.close();
        log::info!("[DRIVER] stopped {}", self.session.scope());
    }

    fn handle_request(&mut self, request: SessionRequest) {
        log::trace!("[DRIVER] request {:?}", request);
        match request {
            SessionRequest::Render { root, respond } => {
                let _ = respond.send(self.session.render_model(&root));
            }
            SessionRequest::Roots { respond } => {
                let _ = respond.send(self.session.roots());
            }
            SessionRequest::Reply { parent, content, respond } => {
                match self.session.prepare_reply(parent, &content) {
                    Ok(record) => self.spawn_append(record, respond),
                    Err(e) => {
                        let _ = respond.send(Err(e));
                    }
                }
            }
            SessionRequest::Like { reply_id, respond } => match self.session.prepare_like(&reply_id) {
                Ok(()) => self.spawn_like(reply_id, respond),
                Err(e) => {
                    let _ = respond.send(Err(e));
                }
            },
            SessionRequest::View { action, respond } => {
                let result = match action {
                    ViewAction::ToggleExpand(id) => self.session.toggle_expand(&id),
                    ViewAction::ToggleCollapse(id) => self.session.toggle_collapse(&id),
                    ViewAction::Focus(id) => self.session.focus(&id),
                    ViewAction::Unfocus => self.session.unfocus(),
                    ViewAction::SetDraftTarget(target) => self.session.set_draft_target(target),
                };
                let _ = respond.send(result);
            }
            // handled by the run loop, which also stops serving
            SessionRequest::Close { respond } => {
                self.session.close();
                let _ = respond.send(());
            }
        }
    }

    fn spawn_append(&self, record: ReplyRecord, respond: Respond<ReplyRecord>) {
        let store = Arc::clone(self.session.store());
        let scope = self.session.scope().clone();
        let done = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = mutator::append_reply(store.as_ref(), &scope, record).await;
            // driver gone: dropping `respond` tells the caller the view closed
            let _ = done.send(Completion::Reply { result, respond });
        });
    }

    fn spawn_like(&self, reply_id: NodeId, respond: Respond<LikeOutcome>) {
        let store = Arc::clone(self.session.store());
        let scope = self.session.scope().clone();
        let user = self.session.viewer().id.clone();
        let done = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = mutator::toggle_like(store.as_ref(), &scope, &reply_id, &user).await;
            let _ = done.send(Completion::Like { result, respond });
        });
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Reply { result, respond } => {
                let result = result.and_then(|record| {
                    self.session.apply_reply_ack(record.clone())?;
                    Ok(record)
                });
                let _ = respond.send(result);
            }
            Completion::Like { result, respond } => {
                let result = result.and_then(|outcome| {
                    self.session.apply_like_ack(&outcome)?;
                    Ok(outcome)
                });
                let _ = respond.send(result);
            }
        }
    }
}

/// Cloneable front end to a running [`SessionDriver`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(Respond<T>) -> SessionRequest,
    ) -> Result<T, ThreadError> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(make(respond))
            .await
            .map_err(|_| ThreadError::Closed)?;
        rx.await.map_err(|_| ThreadError::Closed)?
    }

    pub async fn render_model(&self, root: &NodeId) -> Result<RenderModel, ThreadError> {
        let root = root.clone();
        self.call(|respond| SessionRequest::Render { root, respond }).await
    }

    pub async fn roots(&self) -> Result<Vec<NodeId>, ThreadError> {
        self.call(|respond| SessionRequest::Roots { respond }).await
    }

    pub async fn reply(
        &self,
        parent: Option<NodeId>,
        content: impl Into<String>,
    ) -> Result<ReplyRecord, ThreadError> {
        let content = content.into();
        self.call(|respond| SessionRequest::Reply { parent, content, respond })
            .await
    }

    pub async fn like(&self, reply_id: &NodeId) -> Result<LikeOutcome, ThreadError> {
        let reply_id = reply_id.clone();
        self.call(|respond| SessionRequest::Like { reply_id, respond }).await
    }

    pub async fn toggle_expand(&self, id: &NodeId) -> Result<(), ThreadError> {
        self.view(ViewAction::ToggleExpand(id.clone())).await
    }

    pub async fn toggle_collapse(&self, id: &NodeId) -> Result<(), ThreadError> {
        self.view(ViewAction::ToggleCollapse(id.clone())).await
    }

    pub async fn focus(&self, id: &NodeId) -> Result<(), ThreadError> {
        self.view(ViewAction::Focus(id.clone())).await
    }

    pub async fn unfocus(&self) -> Result<(), ThreadError> {
        self.view(ViewAction::Unfocus).await
    }

    pub async fn set_draft_target(&self, target: Option<NodeId>) -> Result<(), ThreadError> {
        self.view(ViewAction::SetDraftTarget(target)).await
    }

    async fn view(&self, action: ViewAction) -> Result<(), ThreadError> {
        self.call(|respond| SessionRequest::View { action, respond }).await
    }

    /// Closes the view. Waits until the driver unsubscribed; a no-op if it
    /// already stopped.
    pub async fn close(&self) {
        let (respond, rx) = oneshot::channel();
        if self.tx.send(SessionRequest::Close { respond }).await.is_ok() {
            let _ = rx.await;
        }
    }
}
