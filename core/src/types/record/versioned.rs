use super::Record;
use redb::TypeName;

/// Leading byte of a stored V1 record.
const RECORD_V1: u8 = 1;

#[derive(Debug, Clone)]
pub enum VersionedRecord {
    V1(Record),
}

impl VersionedRecord {
    pub fn into_latest(self) -> Record {
        match self {
            VersionedRecord::V1(record) => record,
        }
    }
}

impl redb::Value for VersionedRecord {
    type SelfType<'a> = VersionedRecord;
    type AsBytes<'a> = Vec<u8>;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        let (version, data) = data.split_first().expect("empty record");
        match *version {
            RECORD_V1 => {
                let v1 = postcard::from_bytes::<Record>(data).expect("invalid record");
                VersionedRecord::V1(v1)
            }
            version => panic!("unsupported record version: {}", version),
        }
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        match value {
            VersionedRecord::V1(v1) => postcard::to_extend(v1, vec![RECORD_V1]).unwrap(),
        }
    }

    fn type_name() -> TypeName {
        TypeName::new("relay::Record")
    }
}
