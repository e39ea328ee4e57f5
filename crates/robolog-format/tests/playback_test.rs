//! End-to-end playback tests: write a recording with the fixture writer,
//! then read it back through the facade.

use std::collections::BTreeMap;
use std::path::PathBuf;

use robolog_core::{Direction, ReadArgs, SubscribePayload, Time};
use robolog_format::codec::{CHUNK_HEADER_SIZE, FOOTER_SIZE};
use robolog_format::{Compression, Error, LogSource, LogWriter, ReadConfig};

/// 50 IMU messages every 1µs starting at t=0, plus a lidar scan every
/// 10µs, plus two channels that must be skipped with alerts (unsupported
/// encoding, missing schema). Small chunk target forces several chunks.
fn fixture_bytes(compression: Compression) -> Vec<u8> {
    let mut writer = LogWriter::new("robot-test", compression).with_chunk_size_target(256);

    writer.add_schema("imu/Sample", "jsonschema", b"{\"type\":\"object\"}");
    writer.add_schema("lidar/Scan", "jsonschema", b"{\"type\":\"object\"}");

    let mut imu_meta = BTreeMap::new();
    imu_meta.insert("publisher".to_string(), "imu_driver".to_string());
    let imu = writer.add_channel("/imu", "imu/Sample", "json", imu_meta);
    let scan = writer.add_channel("/scan", "lidar/Scan", "json", BTreeMap::new());
    // Skipped: encoding nobody decodes
    writer.add_channel("/camera", "imu/Sample", "h264", BTreeMap::new());
    // Skipped: schema never declared
    writer.add_channel("/broken", "missing/Schema", "json", BTreeMap::new());

    for i in 0u64..50 {
        let t = Time::from_nanos(i * 1_000);
        let imu_payload =
            serde_json::to_vec(&serde_json::json!({"x": i, "y": i * 2, "temp": 20.5})).unwrap();
        writer.write(imu, t, t, &imu_payload).unwrap();

        if i % 10 == 0 {
            let scan_payload =
                serde_json::to_vec(&serde_json::json!({"ranges": [1.0, 2.0, 3.0]})).unwrap();
            writer.write(scan, t, t, &scan_payload).unwrap();
        }
    }

    writer.finish().unwrap()
}

async fn fixture_source(compression: Compression) -> (LogSource, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.rlog");
    std::fs::write(&path, fixture_bytes(compression)).unwrap();
    let source = LogSource::open_file(&path).await.unwrap();
    (source, dir)
}

#[tokio::test]
async fn test_initialize_catalog() {
    let (source, _dir) = fixture_source(Compression::Lz4).await;
    assert!(source.is_indexed());

    let init = source.initialize();
    assert_eq!(init.profile.as_deref(), Some("robot-test"));
    assert_eq!(init.start, Time::ZERO);
    assert_eq!(init.end, Time::from_nanos(49_000));

    let names: Vec<&str> = init.topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["/imu", "/scan"]);

    // The two bad channels were skipped, not fatal
    assert_eq!(init.alerts.len(), 2);

    assert!(init.publishers_by_topic["/imu"].contains("imu_driver"));
    // No publisher metadata: numeric channel id fallback
    assert!(init.publishers_by_topic["/scan"].contains("2"));

    assert_eq!(init.topic_stats["/imu"].num_messages, 50);
    assert_eq!(init.topic_stats["/scan"].num_messages, 5);
    assert_eq!(init.datatypes.len(), 2);

    assert_eq!(source.start(), Some(Time::ZERO));
}

#[tokio::test]
async fn test_iterates_all_messages_in_time_order_within_range() {
    let (source, _dir) = fixture_source(Compression::Lz4).await;
    let init = source.initialize();

    let mut cursor = source.message_cursor(ReadArgs::for_topics(["/imu", "/scan"]));
    let items = cursor.collect_all().await.unwrap();

    let messages: Vec<_> = items.iter().filter_map(|item| item.as_message()).collect();
    assert_eq!(messages.len(), 55);
    assert!(items.iter().all(|item| !item.is_alert()));

    for pair in messages.windows(2) {
        assert!(pair[0].receive_time <= pair[1].receive_time);
    }
    for message in &messages {
        assert!(message.receive_time >= init.start && message.receive_time <= init.end);
    }
}

#[tokio::test]
async fn test_empty_topic_set_yields_nothing() {
    let (source, _dir) = fixture_source(Compression::Lz4).await;
    let mut cursor = source.message_cursor(ReadArgs::default());
    assert!(cursor.next().await.is_none());
}

#[tokio::test]
async fn test_topic_filter() {
    let (source, _dir) = fixture_source(Compression::Lz4).await;
    let mut cursor = source.message_cursor(ReadArgs::for_topics(["/scan"]));
    let items = cursor.collect_all().await.unwrap();
    assert_eq!(items.len(), 5);
    assert!(items
        .iter()
        .all(|item| item.as_message().unwrap().topic == "/scan"));
}

#[tokio::test]
async fn test_time_range_filter() {
    let (source, _dir) = fixture_source(Compression::Lz4).await;
    let mut args = ReadArgs::for_topics(["/imu", "/scan"]);
    args.start = Some(Time::from_nanos(10_000));
    args.end = Some(Time::from_nanos(19_000));

    let mut cursor = source.message_cursor(args);
    let items = cursor.collect_all().await.unwrap();

    // 10 IMU samples (10µs..19µs) plus the scan at 10µs
    assert_eq!(items.len(), 11);
    for item in &items {
        let time = item.as_message().unwrap().receive_time;
        assert!(time >= Time::from_nanos(10_000) && time <= Time::from_nanos(19_000));
    }
}

#[tokio::test]
async fn test_reverse_iteration_mirrors_forward() {
    let (source, _dir) = fixture_source(Compression::Lz4).await;

    let mut forward = source.message_cursor(ReadArgs::for_topics(["/imu"]));
    let mut forward_times: Vec<Time> = forward
        .collect_all()
        .await
        .unwrap()
        .iter()
        .map(|item| item.as_message().unwrap().receive_time)
        .collect();

    let mut args = ReadArgs::for_topics(["/imu"]);
    args.direction = Direction::Reverse;
    let mut reverse = source.message_cursor(args);
    let reverse_times: Vec<Time> = reverse
        .collect_all()
        .await
        .unwrap()
        .iter()
        .map(|item| item.as_message().unwrap().receive_time)
        .collect();

    forward_times.reverse();
    assert_eq!(forward_times, reverse_times);
}

#[tokio::test]
async fn test_fields_projection() {
    let (source, _dir) = fixture_source(Compression::Lz4).await;
    let mut args = ReadArgs::default();
    args.topics = vec![SubscribePayload::with_fields("/imu", vec!["x".to_string()])];

    let mut cursor = source.message_cursor(args);
    let items = cursor.collect_all().await.unwrap();
    assert_eq!(items.len(), 50);

    for item in items {
        let message = item.into_message().unwrap();
        let object = message.message.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert!(object.contains_key("x"));
    }
}

#[tokio::test]
async fn test_backfill_most_recent_at_or_before() {
    let (source, _dir) = fixture_source(Compression::Lz4).await;
    let subs = vec![
        SubscribePayload::new("/imu"),
        SubscribePayload::new("/scan"),
        SubscribePayload::new("/nonexistent"),
    ];

    let events = source
        .backfill_messages(&subs, Time::from_nanos(25_500))
        .await
        .unwrap();

    // At most one event per topic, sorted ascending by receive time
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].topic, "/scan");
    assert_eq!(events[0].receive_time, Time::from_nanos(20_000));
    assert_eq!(events[1].topic, "/imu");
    assert_eq!(events[1].receive_time, Time::from_nanos(25_000));
}

#[tokio::test]
async fn test_backfill_at_recording_start() {
    let (source, _dir) = fixture_source(Compression::Lz4).await;
    let subs = vec![SubscribePayload::new("/imu")];

    let events = source.backfill_messages(&subs, Time::ZERO).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].receive_time, Time::ZERO);
}

#[tokio::test]
async fn test_per_message_decode_failure_is_an_alert_not_fatal() {
    let mut writer = LogWriter::new("robot-test", Compression::None);
    let ch = writer.add_channel("/imu", "", "json", BTreeMap::new());
    writer
        .write(ch, Time::from_nanos(1), Time::from_nanos(1), b"{\"x\":1}")
        .unwrap();
    writer
        .write(ch, Time::from_nanos(2), Time::from_nanos(2), b"not json at all")
        .unwrap();
    writer
        .write(ch, Time::from_nanos(3), Time::from_nanos(3), b"{\"x\":3}")
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbled.rlog");
    std::fs::write(&path, writer.finish().unwrap()).unwrap();

    let source = LogSource::open_file(&path).await.unwrap();
    let mut cursor = source.message_cursor(ReadArgs::for_topics(["/imu"]));
    let items = cursor.collect_all().await.unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(items.iter().filter(|item| item.is_alert()).count(), 1);
    let times: Vec<Time> = items
        .iter()
        .filter_map(|item| item.as_message())
        .map(|m| m.receive_time)
        .collect();
    assert_eq!(times, vec![Time::from_nanos(1), Time::from_nanos(3)]);
}

#[tokio::test]
async fn test_mixed_extensions_rejected() {
    let paths = vec![PathBuf::from("x.mcap"), PathBuf::from("y.bag")];
    let error = LogSource::open_files(&paths).await.unwrap_err();
    assert!(matches!(error, Error::MixedSourceTypes));
    assert_eq!(error.to_string(), "all sources need to be the same type");
}

#[tokio::test]
async fn test_unreadable_file_is_fatal_with_clear_message() {
    let error = LogSource::open_file("/no/such/dir/recording.rlog")
        .await
        .unwrap_err();
    match error {
        Error::FileAccess { path, .. } => assert!(path.contains("recording.rlog")),
        other => panic!("expected FileAccess, got {:?}", other),
    }
}

#[tokio::test]
async fn test_corrupt_footer_falls_back_to_unindexed() {
    let mut bytes = fixture_bytes(Compression::Lz4);
    let len = bytes.len();
    bytes[len - FOOTER_SIZE..].fill(0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-footer.rlog");
    std::fs::write(&path, bytes).unwrap();

    let source = LogSource::open_file(&path).await.unwrap();
    assert!(!source.is_indexed());

    let init = source.initialize();
    assert_eq!(init.start, Time::ZERO);
    assert_eq!(init.end, Time::from_nanos(49_000));

    let mut cursor = source.message_cursor(ReadArgs::for_topics(["/imu", "/scan"]));
    assert_eq!(cursor.collect_all().await.unwrap().len(), 55);
}

#[tokio::test]
async fn test_unindexed_sequence_matches_indexed() {
    let dir = tempfile::tempdir().unwrap();

    let intact = dir.path().join("intact.rlog");
    std::fs::write(&intact, fixture_bytes(Compression::Lz4)).unwrap();

    let mut corrupted_bytes = fixture_bytes(Compression::Lz4);
    let len = corrupted_bytes.len();
    corrupted_bytes[len - FOOTER_SIZE..].fill(0);
    let corrupted = dir.path().join("corrupted.rlog");
    std::fs::write(&corrupted, corrupted_bytes).unwrap();

    let indexed = LogSource::open_file(&intact).await.unwrap();
    let unindexed = LogSource::open_file(&corrupted).await.unwrap();
    assert!(indexed.is_indexed());
    assert!(!unindexed.is_indexed());

    let args = ReadArgs::for_topics(["/imu", "/scan"]);
    let from_indexed: Vec<(String, Time)> = indexed
        .message_cursor(args.clone())
        .collect_all()
        .await
        .unwrap()
        .iter()
        .map(|item| {
            let m = item.as_message().unwrap();
            (m.topic.clone(), m.receive_time)
        })
        .collect();
    let from_unindexed: Vec<(String, Time)> = unindexed
        .message_cursor(args)
        .collect_all()
        .await
        .unwrap()
        .iter()
        .map(|item| {
            let m = item.as_message().unwrap();
            (m.topic.clone(), m.receive_time)
        })
        .collect();

    assert_eq!(from_indexed, from_unindexed);
}

#[tokio::test]
async fn test_recording_without_channels_is_effectively_unindexed() {
    let writer = LogWriter::new("robot-test", Compression::None);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.rlog");
    std::fs::write(&path, writer.finish().unwrap()).unwrap();

    let source = LogSource::open_file(&path).await.unwrap();
    assert!(!source.is_indexed());
    assert!(source.start().is_none());
    assert!(source.initialize().topics.is_empty());

    let mut cursor = source.message_cursor(ReadArgs::for_topics(["/imu"]));
    assert!(cursor.next().await.is_none());
}

#[tokio::test]
async fn test_unindexed_size_ceiling_is_enforced() {
    let mut bytes = fixture_bytes(Compression::Lz4);
    let len = bytes.len();
    bytes[len - FOOTER_SIZE..].fill(0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.rlog");
    std::fs::write(&path, bytes).unwrap();

    let config = ReadConfig {
        max_unindexed_bytes: 16,
        ..Default::default()
    };
    let error = LogSource::open_files_with_config(&[path], &config)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Unsupported(_)));
}

#[tokio::test]
async fn test_chunk_corruption_surfaces_as_cursor_error() {
    let bytes = fixture_bytes(Compression::None);
    let header = robolog_format::codec::decode_header(&bytes).unwrap();

    // Flip a byte inside the first chunk's payload; the summary stays
    // valid so the indexed reader opens fine, but reading the chunk must
    // fail its CRC check.
    let mut corrupted = bytes.clone();
    corrupted[header.data_position as usize + CHUNK_HEADER_SIZE + 4] ^= 0xFF;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad-chunk.rlog");
    std::fs::write(&path, corrupted).unwrap();

    let source = LogSource::open_file(&path).await.unwrap();
    assert!(source.is_indexed());

    let mut cursor = source.message_cursor(ReadArgs::for_topics(["/imu"]));
    let first = cursor.next().await.unwrap();
    assert!(matches!(
        first,
        Err(Error::Recording(robolog_core::Error::CrcMismatch))
    ));
}
