use super::{Trigger, TriggerError, TriggerEvent};
use crate::context::Context;
use log::{debug, error, info, trace, warn};
use std::{
    io::Read,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{sync_channel, Receiver, SyncSender, TrySendError},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};
use tiny_http::{Request, Response, Server};

/// Interpreting the requests of the different git hosting providers.
pub mod hook;

pub use hook::{GenericHook, HookConfig, HookInterpreter, HookRejection, RepositoryInfo};

/// The time the standalone listener answers the queued requests after cancellation.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_BODY_SIZE: u64 = 1024 * 1024;

/// An incoming HTTP request, independent of the server handling it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WebhookRequest {
    pub method: String,
    /// The path of the URL, without the query.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl WebhookRequest {
    /// The first header with the name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The response to send back to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

impl WebhookResponse {
    fn new(status: u16, body: &str) -> Self {
        WebhookResponse {
            status,
            body: body.to_string(),
        }
    }
}

struct HandlerInner {
    path: String,
    hook: Box<dyn HookInterpreter>,
    config: HookConfig,
    readiness: Arc<AtomicBool>,
    sender: Mutex<Option<SyncSender<TriggerEvent>>>,
}

/// Validates webhook requests and turns them into events.
///
/// It can be cloned and called from any HTTP server (e.g. a router of the host
/// process), or it can be served by the standalone listener of [WebhookTrigger].
#[derive(Clone)]
pub struct WebhookHandler {
    inner: Arc<HandlerInner>,
}

impl WebhookHandler {
    fn new(
        path: String,
        hook: Box<dyn HookInterpreter>,
        config: HookConfig,
        readiness: Arc<AtomicBool>,
    ) -> Self {
        WebhookHandler {
            inner: Arc::new(HandlerInner {
                path,
                hook,
                config,
                readiness,
                sender: Mutex::new(None),
            }),
        }
    }

    fn open(&self, tx: SyncSender<TriggerEvent>) {
        if let Ok(mut sender) = self.inner.sender.lock() {
            *sender = Some(tx);
        }
    }

    fn close(&self) -> Option<SyncSender<TriggerEvent>> {
        self.inner.sender.lock().ok().and_then(|mut sender| sender.take())
    }

    fn sender(&self) -> Option<SyncSender<TriggerEvent>> {
        self.inner
            .sender
            .lock()
            .ok()
            .and_then(|sender| sender.clone())
    }

    fn matches_path(&self, path: &str) -> bool {
        let expected = &self.inner.path;
        expected.is_empty() || expected == path
    }

    fn emit(tx: &SyncSender<TriggerEvent>, event: TriggerEvent) {
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                trace!("An event is already pending, dropping {event:?}.");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Receiver hang up, cannot send the webhook event.");
            }
        }
    }

    fn reject(tx: &SyncSender<TriggerEvent>, status: u16, reason: String) -> WebhookResponse {
        warn!("Webhook request rejected: {reason}.");
        let response = WebhookResponse::new(status, &reason);
        WebhookHandler::emit(tx, TriggerEvent::Failed(TriggerError::Rejected { status, reason }));
        response
    }

    /// Handle the request.
    ///
    /// Until the repository is ready or if the path doesn't match, it is a 404.
    /// If the trigger is not running, it is a 503. Requests that are not POST or
    /// refused by the hook are answered with an error status and sent as failed
    /// events. Accepted requests send an update event and get a 200 `OK`.
    pub fn handle(&self, request: &WebhookRequest) -> WebhookResponse {
        trace!("Received request on {} {}.", request.method, request.path);

        if !self.inner.readiness.load(Ordering::Acquire) {
            return WebhookResponse::new(404, "Not Found");
        }
        if !self.matches_path(&request.path) {
            return WebhookResponse::new(404, "Not Found");
        }
        let Some(tx) = self.sender() else {
            return WebhookResponse::new(503, "Service Unavailable");
        };

        if !request.method.eq_ignore_ascii_case("POST") {
            return WebhookHandler::reject(
                &tx,
                400,
                format!("only POST method accepted, got {}", request.method),
            );
        }

        match self.inner.hook.interpret(request, &self.inner.config) {
            Ok(()) => {
                debug!("Webhook request accepted.");
                WebhookHandler::emit(&tx, TriggerEvent::Update);
                WebhookResponse::new(200, "OK")
            }
            Err(rejection) => WebhookHandler::reject(&tx, rejection.status, rejection.reason),
        }
    }
}

fn to_webhook_request(request: &mut Request) -> WebhookRequest {
    let url = request.url();
    let path = url.split_once('?').map_or(url, |(path, _)| path).to_string();
    let headers = request
        .headers()
        .iter()
        .map(|header| {
            (
                header.field.as_str().as_str().to_string(),
                header.value.as_str().to_string(),
            )
        })
        .collect();

    let mut body = vec![];
    if let Err(err) = request
        .as_reader()
        .take(MAX_BODY_SIZE)
        .read_to_end(&mut body)
    {
        debug!("Cannot read the request body: {err}.");
    }

    WebhookRequest {
        method: request.method().to_string(),
        path,
        headers,
        body,
    }
}

fn respond(request: Request, response: WebhookResponse) {
    let response = Response::from_string(response.body).with_status_code(response.status);
    if let Err(err) = request.respond(response) {
        debug!("Cannot respond to the webhook request: {err}.");
    }
}

/// A trigger that updates on webhook requests.
///
/// This could be used to update from git remotes (e.g. GitHub, GitLab) immediately.
/// With an address it starts a minimal HTTP 1.1 server, otherwise the
/// [WebhookHandler] has to be served by the host process.
pub struct WebhookTrigger {
    handler: WebhookHandler,
    address: Option<String>,
    grace: Duration,
    local_addr: Option<SocketAddr>,
    started: bool,
}

impl WebhookTrigger {
    /// Create a new webhook trigger.
    ///
    /// The path must start with `/`, an empty path accepts every path. The address
    /// can be a port (e.g. "1234") or a socket address (e.g. "0.0.0.0:1234").
    pub fn new(
        path: &str,
        address: Option<&str>,
        hook: Box<dyn HookInterpreter>,
        config: HookConfig,
        readiness: Arc<AtomicBool>,
    ) -> Result<Self, TriggerError> {
        if !path.is_empty() && !path.starts_with('/') {
            return Err(TriggerError::Misconfigured(format!(
                "path {path:?} should be of the format /path"
            )));
        }

        let address = address.map(|address| {
            if address.chars().all(|ch| ch.is_ascii_digit()) {
                format!("0.0.0.0:{address}")
            } else {
                address.to_string()
            }
        });

        Ok(WebhookTrigger {
            handler: WebhookHandler::new(path.to_string(), hook, config, readiness),
            address,
            grace: DEFAULT_SHUTDOWN_GRACE,
            local_addr: None,
            started: false,
        })
    }

    /// Set the time the listener answers queued requests after cancellation.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// The handler to serve from another HTTP server.
    pub fn handler(&self) -> WebhookHandler {
        self.handler.clone()
    }

    /// The address of the standalone listener, after it is started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn listen(server: Arc<Server>, handler: WebhookHandler, context: Context, grace: Duration) {
        let mut failure = None;
        while !context.is_cancelled() {
            match server.recv_timeout(POLL_INTERVAL) {
                Ok(Some(mut request)) => {
                    let response = handler.handle(&to_webhook_request(&mut request));
                    respond(request, response);
                }
                Ok(None) => {}
                Err(err) => {
                    error!("Webhook listener failed: {err}.");
                    failure = Some(err.to_string());
                    break;
                }
            }
        }

        let tx = handler.close();

        // Answer the requests already queued, but not longer than the grace period
        let deadline = Instant::now() + grace;
        while failure.is_none() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match server.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(Some(request)) => {
                    respond(request, WebhookResponse::new(503, "Service Unavailable"))
                }
                Ok(None) | Err(_) => break,
            }
        }
        drop(server);
        debug!("Webhook listener stopped.");

        if let Some(tx) = tx {
            let event = match failure {
                Some(err) => TriggerError::ListenFailed(String::from("webhook"), err),
                None => TriggerError::Cancelled,
            };
            let _ = tx.send(TriggerEvent::Failed(event));
        }
    }

    fn wait(handler: WebhookHandler, context: Context) {
        context.wait();
        if let Some(tx) = handler.close() {
            let _ = tx.send(TriggerEvent::Failed(TriggerError::Cancelled));
        }
    }
}

impl Trigger for WebhookTrigger {
    /// Starts the standalone listener if an address is configured.
    fn start(&mut self, context: &Context) -> Result<Receiver<TriggerEvent>, TriggerError> {
        if self.started {
            return Err(TriggerError::AlreadyStarted);
        }

        let server = match &self.address {
            Some(address) => {
                let server = Server::http(address)
                    .map_err(|err| TriggerError::ListenFailed(address.clone(), err.to_string()))?;
                info!("Listening for webhooks on {address}...");
                Some(Arc::new(server))
            }
            None => None,
        };

        let (tx, rx) = sync_channel(1);
        self.handler.open(tx);
        self.started = true;

        let handler = self.handler.clone();
        let context = context.clone();
        let grace = self.grace;
        let spawned = match server {
            Some(server) => {
                self.local_addr = server.server_addr().to_ip();
                thread::Builder::new()
                    .name(String::from("webhook"))
                    .spawn(move || WebhookTrigger::listen(server, handler, context, grace))
            }
            None => thread::Builder::new()
                .name(String::from("webhook"))
                .spawn(move || WebhookTrigger::wait(handler, context)),
        };
        spawned
            .map_err(|err| TriggerError::ListenFailed(String::from("webhook"), err.to_string()))?;

        Ok(rx)
    }
}
