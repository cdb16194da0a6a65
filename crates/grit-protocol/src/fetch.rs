//! Smart HTTP fetch driver.
//!
//! Drives capability discovery and the single want/done exchange against
//! `git-upload-pack`, then hands the returned pack to the ingest
//! pipeline. See: https://git-scm.com/docs/http-protocol

use crate::pack::PackParser;
use crate::pktline::{self, Frame, FrameReader};
use crate::{ProtocolError, Result};
use grit_storage::{Commit, Object, ObjectId, Repository};
use reqwest::blocking::Client;

const UPLOAD_PACK_SERVICE: &str = "git-upload-pack";
const UPLOAD_PACK_CONTENT_TYPE: &str = "application/x-git-upload-pack-request";
/// The branch a fresh clone fetches and checks out.
const DEFAULT_BRANCH_REF: &str = "refs/heads/master";

/// Basic-auth credentials supplied by the caller.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Username for HTTP basic auth.
    pub username: String,
    /// Password or access token.
    pub password: String,
}

/// One advertised ref.
#[derive(Debug, Clone)]
pub struct RefAdvertisement {
    /// Object id the ref points at.
    pub id: ObjectId,
    /// Full ref name, e.g. `refs/heads/master`.
    pub name: String,
}

/// Fetches the remote master branch into a repository.
pub struct FetchDriver<'a> {
    repo: &'a Repository,
    url: String,
    credentials: Credentials,
    client: Client,
}

impl<'a> FetchDriver<'a> {
    /// Creates a driver for a remote URL.
    pub fn new(
        repo: &'a Repository,
        url: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("grit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let url = url.into();
        let url = url.trim_end_matches('/').to_string();
        Ok(Self {
            repo,
            url,
            credentials,
            client,
        })
    }

    /// Runs the full fetch: discovery, want/done, pack ingest.
    ///
    /// On success the repository's HEAD and master ref point at the
    /// fetched commit, every pack object is resident on disk, and the
    /// commit is returned for checkout.
    pub fn fetch(&self) -> Result<(ObjectId, Commit)> {
        let advertised = self.discover_refs()?;
        let head = advertised
            .iter()
            .find(|advert| advert.name == DEFAULT_BRANCH_REF)
            .ok_or_else(|| {
                ProtocolError::Protocol(format!(
                    "remote does not advertise {}",
                    DEFAULT_BRANCH_REF
                ))
            })?;
        tracing::info!(id = %head.id, refname = DEFAULT_BRANCH_REF, "fetching");

        self.repo.refs().write_head_symbolic(DEFAULT_BRANCH_REF)?;
        self.repo.refs().write_ref(DEFAULT_BRANCH_REF, &head.id)?;

        let pack = self.request_pack(&head.id)?;
        let ids = PackParser::new(&pack).ingest(self.repo.objects())?;
        tracing::info!(objects = ids.len(), "pack ingested");

        let commit = match self.repo.objects().read(&head.id)? {
            Object::Commit(commit) => commit,
            other => {
                return Err(ProtocolError::Protocol(format!(
                    "{} is a {}, not a commit",
                    head.id,
                    other.object_type()
                )))
            }
        };
        Ok((head.id, commit))
    }

    /// GETs `info/refs` and parses the ref advertisement.
    fn discover_refs(&self) -> Result<Vec<RefAdvertisement>> {
        let url = format!("{}/info/refs?service={}", self.url, UPLOAD_PACK_SERVICE);
        tracing::debug!(url = %url, "requesting ref advertisement");
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()?
            .error_for_status()?;
        let body = response.bytes()?;
        let mut frames = FrameReader::new(&body);

        let announcement = format!("# service={}", UPLOAD_PACK_SERVICE);
        match frames.next_frame()? {
            Some(Frame::Data(data)) if data == announcement.as_bytes() => {}
            other => {
                return Err(ProtocolError::Protocol(format!(
                    "missing service announcement, got {}",
                    describe(other.as_ref())
                )))
            }
        }
        match frames.next_frame()? {
            Some(Frame::Flush) => {}
            other => {
                return Err(ProtocolError::Protocol(format!(
                    "expected flush after announcement, got {}",
                    describe(other.as_ref())
                )))
            }
        }

        let mut refs = Vec::new();
        while let Some(frame) = frames.next_frame()? {
            let Frame::Data(data) = frame else {
                break;
            };
            refs.push(parse_ref_line(&data)?);
        }
        Ok(refs)
    }

    /// POSTs the want/done request and returns the raw pack bytes.
    fn request_pack(&self, want: &ObjectId) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        body.extend_from_slice(&pktline::encode_data(
            format!("want {}\n", want).as_bytes(),
        ));
        body.extend_from_slice(&pktline::encode_flush());
        body.extend_from_slice(&pktline::encode_data(b"done\n"));

        let url = format!("{}/{}", self.url, UPLOAD_PACK_SERVICE);
        tracing::debug!(url = %url, want = %want, "requesting pack");
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header("Content-Type", UPLOAD_PACK_CONTENT_TYPE)
            .body(body)
            .send()?
            .error_for_status()?;
        let bytes = response.bytes()?;

        let mut frames = FrameReader::new(&bytes);
        match frames.next_frame()? {
            Some(Frame::Data(data)) if data == b"NAK" => {}
            other => {
                return Err(ProtocolError::Protocol(format!(
                    "expected NAK, got {}",
                    describe(other.as_ref())
                )))
            }
        }
        match frames.next_frame()? {
            Some(Frame::Data(pack)) if pack.starts_with(b"PACK") => Ok(pack),
            other => Err(ProtocolError::Protocol(format!(
                "expected pack data, got {}",
                describe(other.as_ref())
            ))),
        }
    }
}

/// Parses one `<hash> SP <refname>` advertisement line, dropping the
/// capability list after the NUL if present.
fn parse_ref_line(line: &[u8]) -> Result<RefAdvertisement> {
    let line = match line.iter().position(|&b| b == 0) {
        Some(nul) => &line[..nul],
        None => line,
    };
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::Protocol("non-UTF-8 ref advertisement".to_string()))?;
    let (hash, name) = text.split_once(' ').ok_or_else(|| {
        ProtocolError::Protocol(format!("malformed ref advertisement: {}", text))
    })?;
    let id = ObjectId::from_hex(hash)
        .map_err(|_| ProtocolError::Protocol(format!("bad hash in advertisement: {}", hash)))?;
    Ok(RefAdvertisement {
        id,
        name: name.to_string(),
    })
}

fn describe(frame: Option<&Frame>) -> String {
    match frame {
        None => "end of input".to_string(),
        Some(Frame::Flush) => "flush".to_string(),
        Some(Frame::Data(data)) => {
            let preview: Vec<u8> = data.iter().take(64).copied().collect();
            format!("data frame {:?}", String::from_utf8_lossy(&preview))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_ref_line() {
        let line = b"a94a8fe5ccb19ba61c4c0873d391e987982fbbd3 refs/heads/master";
        let advert = parse_ref_line(line).unwrap();
        assert_eq!(advert.name, "refs/heads/master");
        assert_eq!(
            advert.id.to_hex(),
            "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"
        );
    }

    #[test]
    fn test_parse_ref_line_drops_capabilities() {
        let line =
            b"a94a8fe5ccb19ba61c4c0873d391e987982fbbd3 HEAD\0multi_ack side-band-64k ofs-delta";
        let advert = parse_ref_line(line).unwrap();
        assert_eq!(advert.name, "HEAD");
    }

    #[test]
    fn test_parse_ref_line_rejects_garbage() {
        assert!(parse_ref_line(b"no-space-here").is_err());
        assert!(parse_ref_line(b"tooshort refs/heads/master").is_err());
    }

    #[test]
    fn test_want_body_layout() {
        let id = ObjectId::from_hex("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3").unwrap();
        let mut body = Vec::new();
        body.extend_from_slice(&pktline::encode_data(format!("want {}\n", id).as_bytes()));
        body.extend_from_slice(&pktline::encode_flush());
        body.extend_from_slice(&pktline::encode_data(b"done\n"));

        let expected = b"0032want a94a8fe5ccb19ba61c4c0873d391e987982fbbd3\n00000009done\n";
        assert_eq!(body, expected.to_vec());
    }
}
