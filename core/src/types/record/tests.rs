use super::versioned::VersionedRecord;
use super::*;

fn make_id(s: &str) -> RecordId {
    RecordId::try_new(s.to_string()).unwrap()
}

mod text {
    use super::*;

    #[test]
    fn test_size_follows_utf8_length() {
        let now = SystemTime::now();
        let record = Record::text(make_id("1ka1"), "héllo", now).unwrap();

        assert_eq!(record.kind(), RecordKind::TextContent);
        assert_eq!(record.file_size(), 6);
        assert_eq!(record.file_type(), TEXT_FILE_TYPE);
        assert!(record.checksum().is_empty());
        assert_eq!(record.created_at(), now);
        assert_eq!(record.updated_at(), now);
    }

    #[test]
    fn test_set_text_resyncs_size() {
        let mut record = Record::text(make_id("1ka1"), "a", SystemTime::now()).unwrap();
        record.set_text("abcd").unwrap();
        assert_eq!(record.file_size(), 4);
        assert_eq!(record.text_content(), "abcd");
    }

    #[test]
    fn test_blank_text_rejected() {
        let result = Record::text(make_id("1ka1"), "  \n", SystemTime::now());
        assert_eq!(result, Err(ValidationError::EmptyText));
    }

    #[test]
    fn test_text_setter_on_file_rejected() {
        let mut record = Record::file(make_id("1ka1"), "a.txt", SystemTime::now()).unwrap();
        assert_eq!(
            record.set_text("x"),
            Err(ValidationError::WrongKind {
                expected: RecordKind::TextContent
            })
        );
    }
}

mod file {
    use super::*;

    #[test]
    fn test_file_type_follows_name() {
        let mut record = Record::file(make_id("1ka1"), "Photo.JPG", SystemTime::now()).unwrap();
        assert_eq!(record.file_type(), "image/jpeg");
        assert!(record.is_image());

        record.set_file_name("notes.pdf").unwrap();
        assert_eq!(record.file_type(), "application/pdf");
        assert!(!record.is_image());
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let record = Record::file(make_id("1ka1"), "Makefile", SystemTime::now()).unwrap();
        assert_eq!(record.file_type(), "application/octet-stream");
    }

    #[test]
    fn test_name_is_trimmed() {
        let record = Record::file(make_id("1ka1"), "  a.png ", SystemTime::now()).unwrap();
        assert_eq!(record.file_name(), "a.png");
    }

    #[test]
    fn test_blank_name_rejected() {
        assert_eq!(
            Record::file(make_id("1ka1"), " ", SystemTime::now()),
            Err(ValidationError::FileNameTooShort)
        );
    }

    #[test]
    fn test_set_content_sets_size_and_checksum() {
        let mut record = Record::file(make_id("1ka1"), "a.bin", SystemTime::now()).unwrap();
        record.set_content(b"file content");

        assert_eq!(record.file_size(), 12);
        assert_eq!(record.checksum(), content_digest(b"file content"));
        assert_eq!(record.checksum().len(), 64);
    }

    #[test]
    fn test_zip_archive_naming() {
        let record = Record::zip_archive(make_id("1ka9"), "relay_all_files", SystemTime::now());
        assert_eq!(record.file_name(), "relay_all_files_1ka9.zip");
        assert!(record.is_zip_archive());
        assert!(record.is_file());
    }
}

#[test]
fn record_v1_serialization() {
    let mut original = Record::file(make_id("1ka1"), "a.txt", SystemTime::now()).unwrap();
    original.set_content(b"payload");

    let versioned = VersionedRecord::V1(original.clone());
    let bytes = <VersionedRecord as redb::Value>::as_bytes(&versioned);
    assert_eq!(bytes[0], 1);

    let decoded = <VersionedRecord as redb::Value>::from_bytes(&bytes).into_latest();
    assert_eq!(decoded, original);
}

#[test]
fn timestamps_format_as_rfc3339() {
    let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_781_481_600);
    assert_eq!(format_timestamp(t), "2026-06-15T00:00:00Z");
}
