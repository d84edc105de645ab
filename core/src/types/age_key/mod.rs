use crate::types::{IncreaseId, RecordId};
use redb::TypeName;
use std::cmp::Ordering;
use std::time::{Duration, SystemTime};

/// Index entry ordering records by `updated_at`, then by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeKey {
    pub updated_at: SystemTime,
    pub id: RecordId,
}

impl AgeKey {
    /// Smallest possible key at `timestamp`; `..AgeKey::floor(t)` selects
    /// every entry strictly older than `t`.
    pub fn floor(timestamp: SystemTime) -> Self {
        Self {
            updated_at: timestamp,
            // SAFETY: This key is only used for range querying, so the empty id is not stored.
            id: unsafe { RecordId::new_unchecked(String::new()) },
        }
    }
}

fn extract_duration(data: &[u8]) -> (Duration, &[u8]) {
    let (secs, data) = data.split_first_chunk::<8>().unwrap();
    let secs = u64::from_be_bytes(*secs);
    let (nanos, data) = data.split_first_chunk::<4>().unwrap();
    let nanos = u32::from_be_bytes(*nanos);

    (Duration::new(secs, nanos), data)
}

fn parse_id(data: &[u8]) -> Option<IncreaseId> {
    str::from_utf8(data).ok()?.parse().ok()
}

/// Issued ids compare by allocation order. Anything else (the empty floor id
/// included) sorts before them, by string.
fn compare_ids(data1: &[u8], data2: &[u8]) -> Ordering {
    match (parse_id(data1), parse_id(data2)) {
        (Some(id1), Some(id2)) => id1.cmp(&id2),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => <RecordId as redb::Key>::compare(data1, data2),
    }
}

impl redb::Key for AgeKey {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        let (data1_duration, data1) = extract_duration(data1);
        let (data2_duration, data2) = extract_duration(data2);

        data1_duration
            .cmp(&data2_duration)
            .then_with(|| compare_ids(data1, data2))
    }
}

impl redb::Value for AgeKey {
    type SelfType<'a> = AgeKey;
    type AsBytes<'a> = Vec<u8>;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        let (since_epoch, data) = extract_duration(data);
        let id = <RecordId as redb::Value>::from_bytes(data);

        AgeKey {
            updated_at: SystemTime::UNIX_EPOCH + since_epoch,
            id,
        }
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        let mut bytes = Vec::new();
        let since_epoch = value
            .updated_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap();
        bytes.extend_from_slice(&since_epoch.as_secs().to_be_bytes());
        bytes.extend_from_slice(&since_epoch.subsec_nanos().to_be_bytes());
        bytes.extend_from_slice(<RecordId as redb::Value>::as_bytes(&value.id));
        bytes
    }

    fn type_name() -> TypeName {
        TypeName::new("relay::AgeKey")
    }
}
