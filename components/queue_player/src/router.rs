//! Single-flight hand-off between connection handlers and the coordinator.
//!
//! Any number of handlers may hold a `Router`; only one command is ever on
//! its way to the coordinator. Later submitters wait for the in-flight
//! command's response before theirs is forwarded.

use control_protocol::{Command, Response};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::warn;

const NOT_RUNNING: &str = "The player is not running";
const NO_RESPONSE: &str = "The player stopped before responding";

/// A command paired with the slot its response goes into
pub struct Request {
    command: Command,
    reply: oneshot::Sender<Response>,
}

impl Request {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn into_parts(self) -> (Command, Responder) {
        (self.command, Responder(self.reply))
    }

    pub fn respond(self, response: Response) {
        Responder(self.reply).send(response)
    }
}

/// Write side of a request's response slot
pub struct Responder(oneshot::Sender<Response>);

impl Responder {
    pub fn send(self, response: Response) {
        if self.0.send(response).is_err() {
            warn!("Submitter went away before the response was delivered");
        }
    }
}

#[derive(Clone)]
pub struct Router {
    sender: mpsc::Sender<Request>,
    in_flight: Arc<Semaphore>,
}

/// Receiving end, owned by exactly one coordinator
pub struct Inbox {
    receiver: mpsc::Receiver<Request>,
}

impl Router {
    pub fn channel() -> (Router, Inbox) {
        let (sender, receiver) = mpsc::channel(1);
        let router = Router {
            sender,
            in_flight: Arc::new(Semaphore::new(1)),
        };
        (router, Inbox { receiver })
    }

    /// Forward `command` and wait for its response. Always yields exactly
    /// one response; when the coordinator is absent the response is an error
    /// produced here.
    pub async fn submit(&self, command: Command) -> Response {
        let name = command.name;
        let Ok(_permit) = self.in_flight.acquire().await else {
            return Response::err(NOT_RUNNING);
        };

        if self.sender.is_closed() {
            warn!("Dropping {}: no coordinator attached", name);
            return Response::err(NOT_RUNNING);
        }

        let (reply, response) = oneshot::channel();
        if self.sender.send(Request { command, reply }).await.is_err() {
            warn!("Dropping {}: coordinator stopped", name);
            return Response::err(NOT_RUNNING);
        }

        match response.await {
            Ok(response) => response,
            Err(_) => {
                warn!("Coordinator dropped {} without responding", name);
                Response::err(NO_RESPONSE)
            }
        }
    }
}

impl Inbox {
    pub async fn recv(&mut self) -> Option<Request> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Request> {
        self.receiver.try_recv().ok()
    }

    /// Stop accepting requests; already queued ones can still be drained.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}
