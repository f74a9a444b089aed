use crate::RemoteError;
use silo_store::{extract_archive, Progress, StoreError};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Transient transport statuses: the probe/send loop retries these with
/// backoff, everything else is terminal.
const RETRY_STATUS: [u16; 6] = [408, 429, 500, 502, 503, 504];

const CHUNK: usize = 8192;

/// Agent for signed-URL transfers. Protocol statuses like 308 and the
/// transient 5xx family are data to the state machine, not errors, and a
/// 308 from the blob store is a resume marker, not a redirect to follow.
pub fn transfer_agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(0)
        .max_redirects_will_error(false)
        .build()
        .new_agent()
}

/// Bounded exponential backoff for transient statuses. The original
/// protocol looped forever on 5xx; this bounds the loop and resets the
/// budget whenever the server confirms byte progress.
#[derive(Debug)]
struct Backoff {
    remaining: u32,
    delay: Duration,
}

impl Backoff {
    const MAX_ATTEMPTS: u32 = 6;
    const INITIAL_DELAY: Duration = Duration::from_millis(200);
    const MAX_DELAY: Duration = Duration::from_secs(5);

    fn new() -> Self {
        Self {
            remaining: Self::MAX_ATTEMPTS,
            delay: Self::INITIAL_DELAY,
        }
    }

    #[cfg(test)]
    fn with(remaining: u32, delay: Duration) -> Self {
        Self { remaining, delay }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn pause(&mut self, status: u16) -> Result<(), RemoteError> {
        if self.remaining == 0 {
            return Err(RemoteError::UploadTransport(format!(
                "transient status {status}: retries exhausted"
            )));
        }
        self.remaining -= 1;
        debug!("transient status {status}; retrying in {:?}", self.delay);
        std::thread::sleep(self.delay);
        self.delay = (self.delay * 2).min(Self::MAX_DELAY);
        Ok(())
    }
}

/// Incremental blake3 over the uploaded file. `confirmed` is the offset up
/// to which bytes have been hashed; it only ever moves forward, so a
/// retried range is never hashed twice.
struct RollingChecksum {
    hasher: blake3::Hasher,
    confirmed: u64,
}

impl RollingChecksum {
    fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            confirmed: 0,
        }
    }

    /// Account for a chunk observed at `offset`; returns how many bytes
    /// were newly hashed.
    fn observe(&mut self, offset: u64, chunk: &[u8]) -> u64 {
        let end = offset + chunk.len() as u64;
        if end <= self.confirmed {
            return 0;
        }
        let skip = self.confirmed.saturating_sub(offset) as usize;
        self.hasher.update(&chunk[skip..]);
        let newly = (chunk.len() - skip) as u64;
        self.confirmed = end;
        newly
    }

    /// Hash file bytes `[confirmed, offset)` that were never streamed by
    /// this process — bytes a prior attempt already got to the server.
    fn ensure_through(
        &mut self,
        file: &mut File,
        offset: u64,
        progress: &dyn Progress,
    ) -> Result<(), std::io::Error> {
        if offset <= self.confirmed {
            return Ok(());
        }
        file.seek(SeekFrom::Start(self.confirmed))?;
        let mut buf = [0u8; CHUNK];
        while self.confirmed < offset {
            let want = ((offset - self.confirmed) as usize).min(buf.len());
            let n = file.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            self.hasher.update(&buf[..n]);
            self.confirmed += n as u64;
            progress.advance(n as u64);
        }
        Ok(())
    }

    fn hex(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

/// Streams the not-yet-confirmed tail of the file, feeding the rolling
/// checksum and progress as it goes.
struct TrackedReader<'a> {
    file: &'a mut File,
    offset: u64,
    checksum: &'a mut RollingChecksum,
    progress: &'a dyn Progress,
}

impl Read for TrackedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.file.read(buf)?;
        if n > 0 {
            let newly = self.checksum.observe(self.offset, &buf[..n]);
            self.offset += n as u64;
            self.progress.advance(newly);
        }
        Ok(n)
    }
}

/// Upload a file to a signed URL using a resumable session.
///
/// State machine per file: session init, then a bounded probe-and-send
/// loop. A success status verifies the server's content checksum against
/// the locally computed whole-file digest; a resume status re-sends only
/// the bytes the server does not yet have.
pub fn upload(
    agent: &ureq::Agent,
    signed_url: &str,
    source: &Path,
    progress: &dyn Progress,
) -> Result<(), RemoteError> {
    let session_url = start_session(agent, signed_url)?;

    let mut file = File::open(source)?;
    let total = file.metadata()?.len();
    progress.begin(total);

    let mut checksum = RollingChecksum::new();
    let mut backoff = Backoff::new();
    let mut last_confirmed: u64 = 0;

    loop {
        // zero-length status probe with an unbounded range
        let probe = agent
            .put(&session_url)
            .header("Content-Range", &format!("bytes */{total}"))
            .send_empty()
            .map_err(|e| RemoteError::UploadTransport(e.to_string()))?;
        let status = probe.status().as_u16();
        if RETRY_STATUS.contains(&status) {
            backoff.pause(status)?;
            continue;
        }
        if status == 200 || status == 201 {
            // already complete from a prior attempt
            checksum.ensure_through(&mut file, total, progress)?;
            return verify_checksum(probe.headers(), &checksum);
        }
        if status != 308 {
            return Err(RemoteError::UploadTransport(format!(
                "unexpected status {status} from upload probe"
            )));
        }

        let resume = parse_uploaded_range(probe.headers().get("Range"))?;
        debug!("server confirms {resume}/{total} bytes");
        if resume > last_confirmed {
            backoff.reset();
            last_confirmed = resume;
        }
        if total > 0 && resume >= total {
            return Err(RemoteError::UploadTransport(
                "server reports the full byte range but did not complete".to_owned(),
            ));
        }
        checksum.ensure_through(&mut file, resume, progress)?;
        file.seek(SeekFrom::Start(resume))?;

        let mut req = agent.put(&session_url);
        if resume > 0 {
            req = req.header(
                "Content-Range",
                &format!("bytes {resume}-{}/{total}", total - 1),
            );
        }
        let mut body = TrackedReader {
            file: &mut file,
            offset: resume,
            checksum: &mut checksum,
            progress,
        };
        let resp = req
            .send(ureq::SendBody::from_reader(&mut body))
            .map_err(|e| RemoteError::UploadTransport(e.to_string()))?;
        let status = resp.status().as_u16();
        if RETRY_STATUS.contains(&status) {
            backoff.pause(status)?;
            continue;
        }
        if status == 200 || status == 201 {
            return verify_checksum(resp.headers(), &checksum);
        }
        if status == 308 {
            // partial range accepted; re-probe for the confirmed offset
            continue;
        }
        return Err(RemoteError::UploadTransport(format!(
            "unexpected status {status} while sending upload data"
        )));
    }
}

fn start_session(agent: &ureq::Agent, signed_url: &str) -> Result<String, RemoteError> {
    let resp = agent
        .post(signed_url)
        .header("Content-Type", "application/octet-stream")
        .header("x-goog-resumable", "start")
        .send_empty()
        .map_err(|e| RemoteError::UploadSession(e.to_string()))?;
    let status = resp.status().as_u16();
    if status != 201 {
        return Err(RemoteError::UploadSession(format!(
            "unexpected status {status}"
        )));
    }
    resp.headers()
        .get("Location")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| RemoteError::UploadSession("response is missing the session URL".to_owned()))
}

/// Parse the server's inclusive `Range: bytes=0-N` header into the
/// exclusive count of uploaded bytes. An absent header means nothing has
/// been uploaded yet.
fn parse_uploaded_range(header: Option<&ureq::http::HeaderValue>) -> Result<u64, RemoteError> {
    let Some(value) = header else {
        return Ok(0);
    };
    let malformed = || RemoteError::UploadTransport("malformed Range header".to_owned());
    let text = value.to_str().map_err(|_| malformed())?;
    let (_, end) = text
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .ok_or_else(malformed)?;
    let end: u64 = end.trim().parse().map_err(|_| malformed())?;
    Ok(end + 1)
}

fn verify_checksum(
    headers: &ureq::http::HeaderMap,
    checksum: &RollingChecksum,
) -> Result<(), RemoteError> {
    let expected = headers
        .get("ETag")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_owned())
        .ok_or_else(|| {
            RemoteError::UploadTransport("response is missing the content checksum".to_owned())
        })?;
    let actual = checksum.hex();
    if expected != actual {
        return Err(RemoteError::UploadIntegrity { expected, actual });
    }
    Ok(())
}

/// Reader that feeds download progress as bytes stream through.
struct CountingReader<'a, R> {
    inner: R,
    progress: &'a dyn Progress,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.progress.advance(n as u64);
        Ok(n)
    }
}

/// Download a signed URL's archive and stream it straight into the
/// unarchiver at `dest_dir`. `Content-Length` feeds the progress total and
/// defaults to 0 when unknown.
pub fn download_and_extract(
    agent: &ureq::Agent,
    signed_url: &str,
    dest_dir: &Path,
    progress: &dyn Progress,
) -> Result<(), RemoteError> {
    let resp = agent
        .get(signed_url)
        .call()
        .map_err(|e| RemoteError::Download(e.to_string()))?;
    let status = resp.status().as_u16();
    if status >= 400 {
        return Err(RemoteError::Download(format!(
            "HTTP {status} for signed URL"
        )));
    }

    let total = resp
        .headers()
        .get("Content-Length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    progress.begin(total);

    let reader = CountingReader {
        inner: resp.into_body().into_reader(),
        progress,
    };
    extract_archive(reader, dest_dir).map_err(|e| match e {
        e @ StoreError::PathTraversal(_) => RemoteError::Store(e),
        other => RemoteError::Download(other.to_string()),
    })
}
