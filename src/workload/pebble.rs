//! Client for the Pebble API of the workload container.
//!
//! This module provides the [`PebbleClient`] struct, the [`Workload`]
//! implementation used in production. The workload Pebble is reached through
//! the unix socket the Juju agent mounts in the charm container, speaking
//! HTTP/1.1 over it. Pebble answers every request with a JSON envelope:
//!
//! ```json
//! {"type": "sync", "status-code": 200, "status": "OK", "result": {}}
//! {"type": "async", "status-code": 202, "status": "Accepted", "change": "42"}
//! {"type": "error", "status-code": 400, "status": "Bad Request", "result": {"message": "..."}}
//! ```
//!
//! Service operations are asynchronous on the Pebble side: the client waits
//! for the returned change to complete before returning. File reads and
//! writes use `multipart/form-data` bodies holding the files and the envelope.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    Method, Request, Response,
    header::{ACCEPT, CONTENT_TYPE, HOST, HeaderValue},
};
use hyper_util::rt::TokioIo;
use log::{debug, info};
use multer::Multipart;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::UnixStream;

use crate::workload::{ServiceInfo, Workload, WorkloadError, layer::Layer};

/// `Host` header sent to Pebble, which ignores it.
const PEBBLE_HOST: &str = "localhost";

/// Client for a Pebble instance.
///
/// Every request opens its own connection.
///
/// # Examples
///
/// ```no_run
/// let pebble = PebbleClient::new(
///     "/charm/containers/maubot/pebble.socket",
///     Duration::from_secs(30),
/// );
/// if pebble.can_connect().await {
///     pebble.restart("maubot").await?;
/// }
/// ```
pub struct PebbleClient {
    transport: Transport,
    /// Timeout of a single request, connection included
    timeout: Duration,
}

/// How the client reaches Pebble.
#[derive(Debug, Clone)]
enum Transport {
    /// Unix socket of the workload container
    Socket(PathBuf),
    /// Plain TCP, `host:port`
    #[cfg(test)]
    Tcp(String),
}

/// Response envelope of the Pebble API.
#[derive(Deserialize, Debug)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "status-code")]
    status_code: u16,
    #[serde(default)]
    status: String,
    #[serde(default)]
    change: Option<String>,
    #[serde(default)]
    result: Value,
}

/// Result of an error envelope, also used for per-file errors.
#[derive(Deserialize, Debug, Default)]
struct ErrorResult {
    #[serde(default)]
    message: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Result of a file operation, one per path.
#[derive(Deserialize, Debug)]
struct FileResult {
    path: String,
    #[serde(default)]
    error: Option<ErrorResult>,
}

/// A Pebble change, as returned when waiting on it.
#[derive(Deserialize, Debug)]
struct Change {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    err: Option<String>,
}

impl PebbleClient {
    /// Create a new [PebbleClient].
    ///
    /// # Arguments
    ///
    /// * `socket` - Path of the Pebble unix socket.
    /// * `timeout` - Timeout of a single request.
    pub fn new(socket: impl AsRef<Path>, timeout: Duration) -> Self {
        PebbleClient {
            transport: Transport::Socket(socket.as_ref().to_owned()),
            timeout,
        }
    }

    /// Create a new [PebbleClient] talking to `address` over TCP.
    #[cfg(test)]
    fn over_tcp(address: &str, timeout: Duration) -> Self {
        PebbleClient {
            transport: Transport::Tcp(address.to_owned()),
            timeout,
        }
    }

    /// Sends a request and collects the whole response.
    async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, WorkloadError> {
        tokio::time::timeout(self.timeout, self.connect_and_send(request))
            .await
            .map_err(|_| WorkloadError::Timeout(self.timeout))?
    }

    async fn connect_and_send(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Bytes>, WorkloadError> {
        match &self.transport {
            Transport::Socket(path) => {
                let stream = UnixStream::connect(path).await?;
                exchange(TokioIo::new(stream), request).await
            }
            #[cfg(test)]
            Transport::Tcp(address) => {
                let stream = tokio::net::TcpStream::connect(address).await?;
                exchange(TokioIo::new(stream), request).await
            }
        }
    }

    /// Sends a request and unwraps the response envelope.
    async fn call(&self, request: Request<Full<Bytes>>) -> Result<Envelope, WorkloadError> {
        let response = self.send(request).await?;
        into_result(parse_envelope(response.body())?)
    }

    /// Waits for a change to be ready and reports its error, if any.
    async fn wait_change(&self, id: &str) -> Result<(), WorkloadError> {
        debug!("wait for change {}", id);

        let envelope = self
            .call(get(&format!("/v1/changes/{}/wait", id), &[])?)
            .await?;
        let change: Change = serde_json::from_value(envelope.result)
            .map_err(|e| WorkloadError::Protocol(format!("invalid change: {}", e)))?;

        match change.err {
            Some(message) if !message.is_empty() => Err(WorkloadError::Change {
                id: change.id,
                message,
            }),
            _ => {
                debug!("change {} is {}", change.id, change.status);
                Ok(())
            }
        }
    }

    /// Runs a service action (`start`, `stop`, `restart`) and waits for it.
    async fn service_action(&self, action: &str, name: &str) -> Result<(), WorkloadError> {
        info!("{} service {}", action, name);

        let request = post_json(
            "/v1/services",
            &json!({"action": action, "services": [name]}),
        )?;
        let envelope = self.call(request).await?;

        let Some(change) = envelope.change else {
            return Err(WorkloadError::Protocol(format!(
                "no change returned for {} of {}",
                action, name
            )));
        };

        self.wait_change(&change).await
    }

    async fn system_info(&self) -> Result<Envelope, WorkloadError> {
        self.call(get("/v1/system-info", &[])?).await
    }
}

/// Runs one HTTP/1.1 exchange over an established connection.
async fn exchange<I>(io: I, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, WorkloadError>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake(io).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("pebble connection closed: {}", e);
        }
    });

    let (parts, body) = sender.send_request(request).await?.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Response::from_parts(parts, body))
}

/// Path and URL-encoded query of a request.
fn request_target(path: &str, query: &[(&str, &str)]) -> Result<String, WorkloadError> {
    if query.is_empty() {
        return Ok(path.to_owned());
    }

    let url = Url::parse_with_params(&format!("http://{}{}", PEBBLE_HOST, path), query)
        .map_err(|e| WorkloadError::Protocol(format!("invalid request path {}: {}", path, e)))?;
    Ok(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
}

fn get(path: &str, query: &[(&str, &str)]) -> Result<Request<Full<Bytes>>, WorkloadError> {
    Ok(Request::builder()
        .method(Method::GET)
        .uri(request_target(path, query)?)
        .header(HOST, PEBBLE_HOST)
        .body(Full::new(Bytes::new()))?)
}

fn post(
    path: &str,
    content_type: &str,
    body: impl Into<Bytes>,
) -> Result<Request<Full<Bytes>>, WorkloadError> {
    Ok(Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(HOST, PEBBLE_HOST)
        .header(CONTENT_TYPE, content_type)
        .body(Full::new(body.into()))?)
}

fn post_json(path: &str, body: &Value) -> Result<Request<Full<Bytes>>, WorkloadError> {
    post(path, "application/json", body.to_string())
}

fn parse_envelope(body: &[u8]) -> Result<Envelope, WorkloadError> {
    serde_json::from_slice(body)
        .map_err(|e| WorkloadError::Protocol(format!("invalid response: {}", e)))
}

/// Turns an error envelope into a [`WorkloadError::Api`].
fn into_result(envelope: Envelope) -> Result<Envelope, WorkloadError> {
    if envelope.kind != "error" {
        return Ok(envelope);
    }

    let error: ErrorResult = serde_json::from_value(envelope.result).unwrap_or_default();
    Err(WorkloadError::Api {
        status_code: envelope.status_code,
        status: envelope.status,
        message: error.message,
        kind: error.kind,
    })
}

/// Reports the first per-file error of a file operation result.
fn check_file_results(result: Value) -> Result<(), WorkloadError> {
    let files: Vec<FileResult> = serde_json::from_value(result)
        .map_err(|e| WorkloadError::Protocol(format!("invalid file result: {}", e)))?;

    match files.into_iter().find_map(|f| f.error.map(|e| (f.path, e))) {
        Some((path, error)) => Err(WorkloadError::Path {
            path,
            message: error.message,
        }),
        None => Ok(()),
    }
}

/// Builds the `multipart/form-data` body writing `content` to `path`.
fn write_form(boundary: &str, path: &str, content: &str) -> String {
    let request = json!({
        "action": "write",
        "files": [{"path": path, "make-dirs": true}],
    });

    format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"request\"\r\n\
         Content-Type: application/json\r\n\r\n\
         {request}\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"files\"; filename=\"{path}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n\
         {content}\r\n\
         --{boundary}--\r\n"
    )
}

impl Workload for PebbleClient {
    async fn can_connect(&self) -> bool {
        match self.system_info().await {
            Ok(_) => true,
            Err(e) => {
                debug!("cannot connect to pebble: {}", e);
                false
            }
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, WorkloadError> {
        debug!("check if {} exists", path);

        let request = get(
            "/v1/files",
            &[("action", "list"), ("path", path), ("itself", "true")],
        )?;

        match self.call(request).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn pull(&self, path: &str) -> Result<String, WorkloadError> {
        debug!("pull {}", path);

        let mut request = get("/v1/files", &[("action", "read"), ("path", path)])?;
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("multipart/form-data"));
        let response = self.send(request).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let Ok(boundary) = multer::parse_boundary(content_type) else {
            // Errors affecting the whole request come back as a plain envelope
            into_result(parse_envelope(response.body())?)?;
            return Err(WorkloadError::Protocol(format!(
                "expected a multipart response, got {}",
                content_type
            )));
        };

        let mut multipart = Multipart::with_reader(&response.body()[..], boundary);
        let mut content = None;
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();
            let data = field.bytes().await?;
            match name.as_str() {
                "files" => content = Some(data),
                "response" => check_file_results(into_result(parse_envelope(&data)?)?.result)?,
                _ => debug!("ignore {} part", name),
            }
        }

        let content = content
            .ok_or_else(|| WorkloadError::Protocol(format!("no content returned for {}", path)))?;
        String::from_utf8(content.to_vec())
            .map_err(|e| WorkloadError::Protocol(format!("{} is not UTF-8: {}", path, e)))
    }

    async fn push(&self, path: &str, content: &str) -> Result<(), WorkloadError> {
        info!("push {}", path);

        let boundary = format!("{:032x}", rand::random::<u128>());
        let request = post(
            "/v1/files",
            &format!("multipart/form-data; boundary={}", boundary),
            write_form(&boundary, path, content),
        )?;

        let envelope = self.call(request).await?;
        check_file_results(envelope.result)
    }

    async fn make_dir(&self, path: &str) -> Result<(), WorkloadError> {
        debug!("make directory {}", path);

        let request = post_json(
            "/v1/files",
            &json!({
                "action": "make-dirs",
                "dirs": [{"path": path, "make-parents": true}],
            }),
        )?;

        let envelope = self.call(request).await?;
        check_file_results(envelope.result)
    }

    async fn add_layer(&self, label: &str, layer: &Layer) -> Result<(), WorkloadError> {
        info!("add layer {}", label);

        let yaml = layer
            .to_yaml()
            .map_err(|e| WorkloadError::Protocol(format!("failed to serialize layer: {}", e)))?;
        let request = post_json(
            "/v1/layers",
            &json!({
                "action": "add",
                "combine": true,
                "label": label,
                "format": "yaml",
                "layer": yaml,
            }),
        )?;

        self.call(request).await?;
        Ok(())
    }

    async fn service(&self, name: &str) -> Result<Option<ServiceInfo>, WorkloadError> {
        let envelope = self.call(get("/v1/services", &[("names", name)])?).await?;
        let services: Vec<ServiceInfo> = serde_json::from_value(envelope.result)
            .map_err(|e| WorkloadError::Protocol(format!("invalid services: {}", e)))?;

        debug!("services matching {} -> {:?}", name, services);

        Ok(services.into_iter().find(|s| s.name == name))
    }

    async fn restart(&self, name: &str) -> Result<(), WorkloadError> {
        self.service_action("restart", name).await
    }

    async fn stop(&self, name: &str) -> Result<(), WorkloadError> {
        self.service_action("stop", name).await
    }
}
