//! Input acquisition: uploaded bytes and bounded URL downloads

use std::fmt;
use std::io::{ErrorKind, Read};
use std::time::Duration;

use ureq::http::Uri;

use crate::error::{AnalysisError, PipelineResult};

/// File extensions accepted as STEP
pub const STEP_EXTENSIONS: [&str; 2] = ["step", "stp"];

/// Default download ceiling (50 MiB)
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// Raw STEP file bytes owned by one request
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawFileBytes(Vec<u8>);

impl RawFileBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RawFileBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for RawFileBytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for RawFileBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawFileBytes({} bytes)", self.0.len())
    }
}

/// Whether a file name ends in a STEP extension (case-insensitive)
pub fn has_step_extension(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        STEP_EXTENSIONS
            .iter()
            .any(|step| ext.eq_ignore_ascii_case(step))
    })
}

/// Check an uploaded file before it reaches the pipeline
pub fn validate_upload(filename: Option<&str>, bytes: &RawFileBytes) -> PipelineResult<()> {
    if let Some(name) = filename.filter(|n| !n.is_empty())
        && !has_step_extension(name)
    {
        return Err(AnalysisError::input(format!(
            "Only .step or .stp files are accepted, got '{}'",
            name
        )));
    }
    if bytes.is_empty() {
        return Err(AnalysisError::input("Uploaded file is empty"));
    }
    Ok(())
}

/// Check a download URL
///
/// The URL must be absolute `http` or `https` with a host. When its last
/// path segment carries an extension, that extension must be a STEP one.
pub fn validate_url(url: &str) -> PipelineResult<Uri> {
    let url = url.trim();
    if url.is_empty() {
        return Err(AnalysisError::input("file_url is required"));
    }

    let uri: Uri = url
        .parse()
        .map_err(|e| AnalysisError::input(format!("Invalid URL '{}': {}", url, e)))?;

    match uri.scheme_str() {
        Some(scheme) if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") => {}
        _ => {
            return Err(AnalysisError::input(format!(
                "Only http and https URLs are supported: {}",
                url
            )));
        }
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(AnalysisError::input(format!("URL has no host: {}", url)));
    }

    let last_segment = uri.path().rsplit('/').next().unwrap_or_default();
    if last_segment.contains('.') && !has_step_extension(last_segment) {
        return Err(AnalysisError::input(format!(
            "URL does not point to a .step or .stp file: {}",
            url
        )));
    }

    Ok(uri)
}

/// Limits applied to outbound downloads
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadLimits {
    pub max_bytes: u64,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for DownloadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Download a STEP file
///
/// Blocking. Anything but `200 OK` is a download error. The body is streamed
/// and abandoned as soon as it exceeds `limits.max_bytes`.
pub fn download(url: &str, limits: &DownloadLimits) -> PipelineResult<RawFileBytes> {
    validate_url(url)?;
    let url = url.trim();

    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(limits.connect_timeout))
        .timeout_recv_response(Some(limits.read_timeout))
        .timeout_recv_body(Some(limits.read_timeout))
        .http_status_as_error(false)
        .build();
    let agent: ureq::Agent = config.into();

    tracing::debug!("Downloading {}", url);
    let response = agent
        .get(url)
        .header(
            "User-Agent",
            concat!("sa-core/", env!("CARGO_PKG_VERSION")),
        )
        .call()
        .map_err(|e| AnalysisError::Download(format!("{}: {}", url, e)))?;

    let status = response.status().as_u16();
    if status != 200 {
        return Err(AnalysisError::Download(format!(
            "HTTP {} from {}",
            status, url
        )));
    }

    let declared = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if let Some(len) = declared
        && len > limits.max_bytes
    {
        tracing::warn!("Refusing {}: declares {} bytes", url, len);
        return Err(AnalysisError::DownloadTooLarge {
            limit: limits.max_bytes,
        });
    }

    let mut reader = response
        .into_body()
        .into_with_config()
        .limit(u64::MAX)
        .reader();
    let bytes = read_bounded(&mut reader, limits.max_bytes)?;
    tracing::debug!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(RawFileBytes::new(bytes))
}

/// Read `reader` to the end, failing once more than `max_bytes` arrive
fn read_bounded<R: Read>(reader: &mut R, max_bytes: u64) -> PipelineResult<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(AnalysisError::Download(e.to_string())),
        };
        if bytes.len() as u64 + n as u64 > max_bytes {
            tracing::warn!("Download aborted after exceeding {} bytes", max_bytes);
            return Err(AnalysisError::DownloadTooLarge { limit: max_bytes });
        }
        bytes.extend_from_slice(&chunk[..n]);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    /// Serve one raw HTTP response on a local port
    fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 4096];
                let _ = stream.read(&mut request);
                let _ = stream.write_all(&response);
                let _ = stream.flush();
            }
        });
        format!("http://{}/part.step", addr)
    }

    fn response(status: &str, headers: &[&str], body: &[u8]) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status);
        for header in headers {
            out.push_str(header);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        let mut out = out.into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn small_limits(max_bytes: u64) -> DownloadLimits {
        DownloadLimits {
            max_bytes,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_step_extension() {
        assert!(has_step_extension("part.step"));
        assert!(has_step_extension("PART.STP"));
        assert!(has_step_extension("a.b.Step"));
        assert!(!has_step_extension("part.stl"));
        assert!(!has_step_extension("step"));
    }

    #[test]
    fn test_validate_upload() {
        let bytes = RawFileBytes::from(&b"ISO-10303-21;"[..]);
        assert!(validate_upload(Some("part.stp"), &bytes).is_ok());
        assert!(validate_upload(None, &bytes).is_ok());
        assert!(matches!(
            validate_upload(Some("part.obj"), &bytes),
            Err(AnalysisError::Input(_))
        ));
        assert!(matches!(
            validate_upload(Some("part.step"), &RawFileBytes::default()),
            Err(AnalysisError::Input(_))
        ));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/part.step").is_ok());
        assert!(validate_url("http://example.com/files/part.STP").is_ok());
        assert!(validate_url("https://example.com/download?id=3").is_ok());
        assert!(validate_url("https://example.com/").is_ok());

        for bad in [
            "",
            "   ",
            "ftp://example.com/part.step",
            "file:///tmp/part.step",
            "/part.step",
            "https://example.com/part.stl",
            "not a url",
        ] {
            assert!(
                matches!(validate_url(bad), Err(AnalysisError::Input(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_read_bounded() {
        let data = vec![7u8; 1000];
        assert_eq!(read_bounded(&mut data.as_slice(), 1000).unwrap().len(), 1000);
        assert!(matches!(
            read_bounded(&mut data.as_slice(), 999),
            Err(AnalysisError::DownloadTooLarge { limit: 999 })
        ));
    }

    #[test]
    fn test_download_ok() {
        let body = b"ISO-10303-21;\nEND-ISO-10303-21;\n";
        let url = serve_once(response(
            "200 OK",
            &[&format!("Content-Length: {}", body.len())],
            body,
        ));
        let bytes = download(&url, &small_limits(1024)).unwrap();
        assert_eq!(bytes.as_slice(), body);
    }

    #[test]
    fn test_download_non_200_is_download_error() {
        let url = serve_once(response("404 Not Found", &["Content-Length: 0"], b""));
        let err = download(&url, &small_limits(1024)).unwrap_err();
        assert!(matches!(err, AnalysisError::Download(_)));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_download_declared_oversize_is_rejected() {
        let body = vec![b'x'; 2048];
        let url = serve_once(response("200 OK", &["Content-Length: 2048"], &body));
        assert!(matches!(
            download(&url, &small_limits(1024)),
            Err(AnalysisError::DownloadTooLarge { limit: 1024 })
        ));
    }

    #[test]
    fn test_download_aborts_mid_stream() {
        // No Content-Length: the body runs until the connection closes
        let body = vec![b'x'; 256 * 1024];
        let url = serve_once(response("200 OK", &[], &body));
        assert!(matches!(
            download(&url, &small_limits(100 * 1024)),
            Err(AnalysisError::DownloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_download_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = download(&format!("http://{}/part.step", addr), &small_limits(1024)).unwrap_err();
        assert!(matches!(err, AnalysisError::Download(_)));
    }
}
