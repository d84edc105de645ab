use nutype::nutype;
use redb::TypeName;
use std::cmp::Ordering;
use std::str;

/// Primary key of a stored record: the string form of an [`IncreaseId`].
///
/// [`IncreaseId`]: crate::types::IncreaseId
#[nutype(
    new_unchecked,
    sanitize(trim),
    validate(not_empty),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Deref,
        Into,
        Hash,
        Display,
        Serialize,
        Deserialize,
    )
)]
pub struct RecordId(String);

impl redb::Key for RecordId {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        let s1 = str::from_utf8(data1).expect("invalid UTF-8 in record id");
        let s2 = str::from_utf8(data2).expect("invalid UTF-8 in record id");

        s1.cmp(s2)
    }
}

impl redb::Value for RecordId {
    type SelfType<'a> = Self;
    type AsBytes<'a> = &'a [u8];

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        let s = str::from_utf8(data).expect("invalid UTF-8 in record id");
        // SAFETY: ids are only written through `as_bytes` of a validated value,
        // except for the empty range bound which is never stored.
        unsafe { Self::new_unchecked(s.to_string()) }
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        value.as_bytes()
    }

    fn type_name() -> TypeName {
        TypeName::new("relay::RecordId")
    }
}
