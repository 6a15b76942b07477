use crate::detector::{DetectionReport, Detector, DetectorError};
use crate::model::NewDetection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const API_VERSION: &str = "1.0";

/// Object detector served over HTTP. The service reads the image from a
/// shared filesystem and answers with boxes in pixel coordinates.
pub struct RemoteDetector {
    endpoint: String,
    timeout: Duration,
}

impl RemoteDetector {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    fn call_remote(&self, image: &Path) -> Result<DetectResponse, RemoteError> {
        let target = Endpoint::parse(&self.endpoint)?;
        let sent_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(RemoteError::Timestamp)?;
        let body = serde_json::to_vec(&DetectRequest {
            api_version: API_VERSION,
            image_path: image,
            timestamp: sent_at,
        })
        .map_err(RemoteError::Json)?;
        let reply = target.post_json(&body, self.timeout)?;
        serde_json::from_slice(&reply).map_err(RemoteError::Json)
    }
}

impl fmt::Debug for RemoteDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteDetector")
            .field("endpoint", &self.endpoint)
            .field("timeout_ms", &self.timeout.as_millis())
            .finish()
    }
}

impl Detector for RemoteDetector {
    fn detect(&self, image: &Path) -> Result<DetectionReport, DetectorError> {
        let DetectResponse {
            detections,
            annotated_image_path,
        } = self.call_remote(image)?;
        Ok(DetectionReport {
            detections,
            annotated_image: annotated_image_path,
        })
    }
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    api_version: &'static str,
    image_path: &'a Path,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<NewDetection>,
    #[serde(default)]
    annotated_image_path: Option<PathBuf>,
}

#[derive(Debug)]
enum RemoteError {
    InvalidUrl(&'static str),
    Resolve(String),
    Connect(std::io::Error),
    Io(std::io::Error),
    Status(u16, String),
    Malformed(&'static str),
    Json(serde_json::Error),
    Timestamp(time::error::Format),
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::InvalidUrl(reason) => write!(f, "bad detector url: {reason}"),
            RemoteError::Resolve(reason) => write!(f, "cannot resolve detector host: {reason}"),
            RemoteError::Connect(err) => write!(f, "cannot reach detector: {err}"),
            RemoteError::Io(err) => write!(f, "detector connection error: {err}"),
            RemoteError::Status(code, body) => {
                write!(f, "detector answered {code}: {}", body.trim())
            }
            RemoteError::Malformed(reason) => write!(f, "malformed http reply: {reason}"),
            RemoteError::Json(err) => write!(f, "detector payload error: {err}"),
            RemoteError::Timestamp(err) => write!(f, "request timestamp error: {err}"),
        }
    }
}

impl From<RemoteError> for DetectorError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Resolve(_) | RemoteError::Connect(_) => {
                DetectorError::Unavailable(err.to_string())
            }
            RemoteError::Json(_) | RemoteError::Malformed(_) => {
                DetectorError::InvalidResponse(err.to_string())
            }
            _ => DetectorError::Request(err.to_string()),
        }
    }
}

/// Plain-http endpoint split into its connection parts.
#[derive(Debug, PartialEq)]
struct Endpoint {
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    fn parse(url: &str) -> Result<Self, RemoteError> {
        let rest = url
            .strip_prefix("http://")
            .ok_or(RemoteError::InvalidUrl("only http:// is supported"))?;
        let (authority, path) = rest
            .find('/')
            .map_or((rest, "/"), |slash| rest.split_at(slash));
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .map_err(|_| RemoteError::InvalidUrl("port is not a number"))?,
            ),
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(RemoteError::InvalidUrl("host is empty"));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    fn connect(&self, timeout: Duration) -> Result<TcpStream, RemoteError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| RemoteError::Resolve(err.to_string()))?
            .next()
            .ok_or_else(|| RemoteError::Resolve(format!("{} has no address", self.host)))?;
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(RemoteError::Connect)?;
        stream
            .set_read_timeout(Some(timeout))
            .and_then(|()| stream.set_write_timeout(Some(timeout)))
            .map_err(RemoteError::Io)?;
        Ok(stream)
    }

    /// POSTs `body` and returns the reply body of a 2xx/3xx answer.
    fn post_json(&self, body: &[u8], timeout: Duration) -> Result<Vec<u8>, RemoteError> {
        let mut stream = self.connect(timeout)?;
        let head = format!(
            "POST {path} HTTP/1.1\r\nHost: {host}\r\nContent-Type: application/json\r\nContent-Length: {length}\r\nConnection: close\r\n\r\n",
            path = self.path,
            host = self.host,
            length = body.len(),
        );
        stream
            .write_all(head.as_bytes())
            .and_then(|()| stream.write_all(body))
            .map_err(RemoteError::Io)?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).map_err(RemoteError::Io)?;
        split_reply(&raw)
    }
}

fn split_reply(raw: &[u8]) -> Result<Vec<u8>, RemoteError> {
    let blank = raw
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or(RemoteError::Malformed("no header terminator"))?;
    let head = String::from_utf8_lossy(&raw[..blank]);
    let body = &raw[blank + 4..];
    let code = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(RemoteError::Malformed("no status code"))?;
    if code >= 400 {
        return Err(RemoteError::Status(
            code,
            String::from_utf8_lossy(body).into_owned(),
        ));
    }
    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Serves exactly one request with a canned response and returns the request text.
    fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> Result<(String, thread::JoinHandle<String>), std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let endpoint = format!("http://{}/v1/detect", listener.local_addr()?);
        let handle = thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return String::new();
            };
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            while !request_complete(&request) {
                match stream.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => request.extend_from_slice(&buffer[..read]),
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
            String::from_utf8_lossy(&request).to_string()
        });
        Ok((endpoint, handle))
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((headers, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = headers
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length: "))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        body.len() >= length
    }

    #[test]
    fn endpoint_defaults_port_and_path() -> Result<(), Box<dyn std::error::Error>> {
        let endpoint = Endpoint::parse("http://detector")
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        assert_eq!(
            endpoint,
            Endpoint {
                host: "detector".to_string(),
                port: 80,
                path: "/".to_string()
            }
        );
        let endpoint = Endpoint::parse("http://10.0.0.5:9000/v1/detect")
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        assert_eq!(endpoint.port, 9000);
        assert_eq!(endpoint.path, "/v1/detect");
        Ok(())
    }

    #[test]
    fn endpoint_rejects_https_and_bad_port() {
        assert!(matches!(
            Endpoint::parse("https://detector/"),
            Err(RemoteError::InvalidUrl(_))
        ));
        assert!(matches!(
            Endpoint::parse("http://detector:99999/"),
            Err(RemoteError::InvalidUrl(_))
        ));
        assert!(matches!(
            Endpoint::parse("http://:8080/"),
            Err(RemoteError::InvalidUrl(_))
        ));
    }

    #[test]
    fn reply_without_terminator_is_malformed() {
        assert!(matches!(
            split_reply(b"HTTP/1.1 200 OK\r\n"),
            Err(RemoteError::Malformed(_))
        ));
    }

    #[test]
    fn detect_parses_boxes_and_annotation() -> Result<(), Box<dyn std::error::Error>> {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"detections":[{"label":"person","confidence":0.91,"bbox_x":10,"bbox_y":20,"bbox_width":30,"bbox_height":60,"center_x":25,"center_y":50}],"annotated_image_path":"processed/snap1_bbox.jpg"}"#,
        )?;
        let detector = RemoteDetector::new(endpoint, Duration::from_secs(2));

        let report = detector.detect(Path::new("captured/1/snap.jpg"))?;
        let request = server.join().unwrap_or_default();

        assert!(request.starts_with("POST /v1/detect HTTP/1.1"));
        assert!(request.contains("\"image_path\":\"captured/1/snap.jpg\""));
        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.detections[0].center_x, Some(25));
        assert_eq!(
            report.annotated_image,
            Some(PathBuf::from("processed/snap1_bbox.jpg"))
        );
        Ok(())
    }

    #[test]
    fn http_error_maps_to_request_error() -> Result<(), Box<dyn std::error::Error>> {
        let (endpoint, server) = serve_once("500 Internal Server Error", "model crashed")?;
        let detector = RemoteDetector::new(endpoint, Duration::from_secs(2));

        let result = detector.detect(Path::new("snap.jpg"));
        let _ = server.join();

        assert!(matches!(result, Err(DetectorError::Request(message)) if message.contains("500")));
        Ok(())
    }
}
