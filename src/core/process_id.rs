//! Process id extraction.
//!
//! Where the process id lives depends on the unit type behind the gateway:
//! compute units carry it in the path or in the `process-id` query parameter,
//! messenger units additionally receive it inside the ANS-104 data item posted
//! as the request body.
use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hyper::Uri;
use sha2::{Digest, Sha256};

use crate::config::UnitKind;

/// Query parameter accepted by every unit type.
pub const PROCESS_ID_QUERY_PARAM: &str = "process-id";

const COMPUTE_PATH_PREFIXES: &[&str] = &["state", "cron", "results"];
const MESSENGER_PATH_PREFIXES: &[&str] = &["monitor"];

/// Opaque, non-empty identifier of a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessId(String);

impl ProcessId {
    /// Wrap a raw token; returns `None` for empty or whitespace-only input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.len() == raw.len() {
            Some(Self(raw))
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an inbound request says about its process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedProcess {
    pub process_id: ProcessId,
    /// Owner address carried by a spawn data item; the process is not
    /// indexed anywhere yet, so this is the only source of its owner.
    pub spawn_owner: Option<String>,
}

impl ExtractedProcess {
    fn id_only(process_id: ProcessId) -> Self {
        Self {
            process_id,
            spawn_owner: None,
        }
    }
}

/// Pulls the process id out of an inbound request according to the unit type.
#[derive(Debug, Clone, Copy)]
pub struct ProcessIdExtractor {
    unit: UnitKind,
}

impl ProcessIdExtractor {
    pub fn new(unit: UnitKind) -> Self {
        Self { unit }
    }

    pub fn unit(&self) -> UnitKind {
        self.unit
    }

    /// Extract the process id from the request URI and (buffered) body.
    pub fn extract(&self, uri: &Uri, body: &[u8]) -> Option<ExtractedProcess> {
        if let Some(pid) = Self::from_query(uri) {
            return Some(ExtractedProcess::id_only(pid));
        }

        match self.unit {
            UnitKind::Compute => {
                Self::from_path(uri.path(), COMPUTE_PATH_PREFIXES).map(ExtractedProcess::id_only)
            }
            UnitKind::Messenger => {
                if let Some(pid) = Self::from_path(uri.path(), MESSENGER_PATH_PREFIXES) {
                    return Some(ExtractedProcess::id_only(pid));
                }
                if body.is_empty() {
                    return None;
                }
                let item = DataItemHeader::parse(body)?;
                Some(ExtractedProcess {
                    process_id: item.process_id()?,
                    spawn_owner: item.is_spawn().then(|| item.owner_address()),
                })
            }
        }
    }

    fn from_query(uri: &Uri) -> Option<ProcessId> {
        let query = uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == PROCESS_ID_QUERY_PARAM)
            .and_then(|(_, value)| ProcessId::new(value.into_owned()))
    }

    fn from_path(path: &str, prefixes: &[&str]) -> Option<ProcessId> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let head = segments.next()?;
        if !prefixes.contains(&head) {
            return None;
        }
        let raw = segments.next()?;
        // same token as the percent-decoded `process-id` query value
        let decoded = urlencoding::decode(raw).ok()?;
        ProcessId::new(decoded.into_owned())
    }
}

/// The leading fields of an ANS-104 data item: enough to find its target
/// and compute its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItemHeader<'a> {
    pub signature_type: u16,
    pub signature: &'a [u8],
    pub owner: &'a [u8],
    pub target: Option<&'a [u8]>,
}

impl<'a> DataItemHeader<'a> {
    const TARGET_LEN: usize = 32;

    /// (signature length, owner length) for the supported signature types.
    fn key_lengths(signature_type: u16) -> Option<(usize, usize)> {
        match signature_type {
            1 => Some((512, 512)), // arweave
            2 => Some((64, 32)),   // ed25519
            3 => Some((65, 65)),   // ethereum
            4 => Some((64, 32)),   // solana
            _ => None,
        }
    }

    /// Decode the header; `None` when the bytes are not a well-formed data item.
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        let signature_type = u16::from_le_bytes([*bytes.first()?, *bytes.get(1)?]);
        let (sig_len, owner_len) = Self::key_lengths(signature_type)?;

        let mut offset = 2;
        let signature = bytes.get(offset..offset + sig_len)?;
        offset += sig_len;
        let owner = bytes.get(offset..offset + owner_len)?;
        offset += owner_len;

        let target = match bytes.get(offset)? {
            0 => None,
            1 => Some(bytes.get(offset + 1..offset + 1 + Self::TARGET_LEN)?),
            _ => return None,
        };

        Some(Self {
            signature_type,
            signature,
            owner,
            target,
        })
    }

    /// base64url(sha256(signature)), the id of the data item.
    pub fn id(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.signature))
    }

    /// base64url(sha256(owner)), the wallet address of the signer.
    pub fn owner_address(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.owner))
    }

    pub fn is_spawn(&self) -> bool {
        self.target.is_none()
    }

    /// A message names its process as target; a spawn has no target and
    /// becomes the process itself.
    pub fn process_id(&self) -> Option<ProcessId> {
        match self.target {
            Some(target) => ProcessId::new(URL_SAFE_NO_PAD.encode(target)),
            None => ProcessId::new(self.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_item(sig_type: u16, sig: u8, sig_len: usize, owner_len: usize, target: Option<u8>) -> Vec<u8> {
        let mut bytes = sig_type.to_le_bytes().to_vec();
        bytes.extend(std::iter::repeat_n(sig, sig_len));
        bytes.extend(std::iter::repeat_n(1u8, owner_len));
        match target {
            Some(t) => {
                bytes.push(1);
                bytes.extend(std::iter::repeat_n(t, 32));
            }
            None => bytes.push(0),
        }
        // anchor flag, tag count and tag bytes length; never read
        bytes.push(0);
        bytes.extend([0u8; 16]);
        bytes
    }

    #[test]
    fn test_process_id_rejects_blank() {
        assert!(ProcessId::new("").is_none());
        assert!(ProcessId::new("   ").is_none());
        assert_eq!(ProcessId::new(" abc ").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_query_param_wins_for_every_unit() {
        let uri: Uri = "/result/msg-1?process-id=pid-q&x=1".parse().unwrap();
        for unit in [UnitKind::Compute, UnitKind::Messenger] {
            let extracted = ProcessIdExtractor::new(unit).extract(&uri, b"").unwrap();
            assert_eq!(extracted.process_id.as_str(), "pid-q");
            assert_eq!(extracted.spawn_owner, None);
        }
    }

    #[test]
    fn test_compute_path_segments() {
        let extractor = ProcessIdExtractor::new(UnitKind::Compute);
        for path in ["/state/pid-1", "/cron/pid-1", "/results/pid-1?limit=5"] {
            let uri: Uri = path.parse().unwrap();
            assert_eq!(extractor.extract(&uri, b"").unwrap().process_id.as_str(), "pid-1");
        }

        let uri: Uri = "/state/".parse().unwrap();
        assert!(extractor.extract(&uri, b"").is_none());
        let uri: Uri = "/result/msg-1".parse().unwrap();
        assert!(extractor.extract(&uri, b"").is_none());
    }

    #[test]
    fn test_messenger_monitor_path() {
        let extractor = ProcessIdExtractor::new(UnitKind::Messenger);
        let uri: Uri = "/monitor/pid-9".parse().unwrap();
        assert_eq!(extractor.extract(&uri, b"").unwrap().process_id.as_str(), "pid-9");
    }

    #[test]
    fn test_messenger_body_with_target() {
        let extractor = ProcessIdExtractor::new(UnitKind::Messenger);
        let uri: Uri = "/".parse().unwrap();
        let body = data_item(1, 7, 512, 512, Some(9));

        let extracted = extractor.extract(&uri, &body).unwrap();
        assert_eq!(
            extracted.process_id.as_str(),
            "CQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQk"
        );
        // the sender of a message is not the owner of its target
        assert_eq!(extracted.spawn_owner, None);
    }

    #[test]
    fn test_messenger_spawn_uses_item_id() {
        let extractor = ProcessIdExtractor::new(UnitKind::Messenger);
        let uri: Uri = "/".parse().unwrap();

        let arweave = data_item(1, 7, 512, 512, None);
        assert_eq!(
            extractor.extract(&uri, &arweave).unwrap().process_id.as_str(),
            "FZMwRJYP0jp9qqyc5RNV8fOYlNHD_m3iG1myjOLHfnc"
        );

        let ed25519 = data_item(2, 5, 64, 32, None);
        assert_eq!(
            extractor.extract(&uri, &ed25519).unwrap().process_id.as_str(),
            "sbzM8V7QoL1jY1rmhq-fdeUiqwV8ko459l7oMEjXLHU"
        );
    }

    #[test]
    fn test_spawn_carries_owner_address() {
        let extractor = ProcessIdExtractor::new(UnitKind::Messenger);
        let uri: Uri = "/".parse().unwrap();
        let spawn = data_item(2, 5, 64, 32, None);

        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest([1u8; 32]));
        let extracted = extractor.extract(&uri, &spawn).unwrap();
        assert_eq!(extracted.spawn_owner.as_deref(), Some(expected.as_str()));

        let header = DataItemHeader::parse(&spawn).unwrap();
        assert!(header.is_spawn());
        assert_eq!(header.owner_address(), expected);
    }

    #[test]
    fn test_encoded_path_matches_plain_and_query_forms() {
        for unit in [UnitKind::Compute, UnitKind::Messenger] {
            let extractor = ProcessIdExtractor::new(unit);
            let prefix = match unit {
                UnitKind::Compute => "state",
                UnitKind::Messenger => "monitor",
            };
            let ids: Vec<String> = [
                format!("/{prefix}/pid-a"),
                format!("/{prefix}/pid%2Da"),
                "/x?process-id=pid%2Da".to_string(),
            ]
            .iter()
            .map(|path| {
                let uri: Uri = path.parse().unwrap();
                extractor
                    .extract(&uri, b"")
                    .unwrap()
                    .process_id
                    .as_str()
                    .to_string()
            })
            .collect();
            assert_eq!(ids, vec!["pid-a"; 3]);
        }

        let extractor = ProcessIdExtractor::new(UnitKind::Compute);
        let uri: Uri = "/state/%FF".parse().unwrap();
        assert!(extractor.extract(&uri, b"").is_none());
    }

    #[test]
    fn test_malformed_data_items() {
        assert!(DataItemHeader::parse(&[]).is_none());
        assert!(DataItemHeader::parse(&[9, 0, 1, 2, 3]).is_none());
        // truncated signature
        assert!(DataItemHeader::parse(&data_item(1, 7, 512, 512, None)[..100]).is_none());
        // invalid target flag
        let mut bytes = data_item(2, 5, 64, 32, None);
        bytes[2 + 64 + 32] = 7;
        assert!(DataItemHeader::parse(&bytes).is_none());

        let uri: Uri = "/".parse().unwrap();
        let extractor = ProcessIdExtractor::new(UnitKind::Messenger);
        assert!(extractor.extract(&uri, b"{\"json\":true}").is_none());
    }

    #[test]
    fn test_compute_ignores_body() {
        let extractor = ProcessIdExtractor::new(UnitKind::Compute);
        let uri: Uri = "/".parse().unwrap();
        let body = data_item(1, 7, 512, 512, Some(9));
        assert!(extractor.extract(&uri, &body).is_none());
    }
}
