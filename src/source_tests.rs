//! Unit tests for the source module

#[cfg(test)]
mod tests {
    use crate::source::{FrameRead, TrackSource};
    use std::io::Cursor;

    /// Creates a source over the given bytes
    fn make_source(data: Vec<u8>) -> TrackSource {
        TrackSource::from_reader(Cursor::new(data))
    }

    #[tokio::test]
    async fn test_read_frame_fills_whole_frames_then_reports_eof() {
        let mut source = make_source(vec![7u8; 16]);
        let mut buf = [0u8; 8];

        assert_eq!(source.read_frame(&mut buf).await.unwrap(), FrameRead::Frame);
        assert_eq!(buf, [7u8; 8]);
        assert_eq!(source.read_frame(&mut buf).await.unwrap(), FrameRead::Frame);
        assert_eq!(source.read_frame(&mut buf).await.unwrap(), FrameRead::Eof);
    }

    #[tokio::test]
    async fn test_read_frame_reports_truncation_mid_frame() {
        let mut source = make_source(vec![1u8; 12]);
        let mut buf = [0u8; 8];

        assert_eq!(source.read_frame(&mut buf).await.unwrap(), FrameRead::Frame);
        assert_eq!(
            source.read_frame(&mut buf).await.unwrap(),
            FrameRead::Truncated(4)
        );
        // The stream is exhausted after a truncated tail.
        assert_eq!(source.read_frame(&mut buf).await.unwrap(), FrameRead::Eof);
    }

    #[tokio::test]
    async fn test_reads_after_close_report_eof() {
        let mut source = make_source(vec![1u8; 32]);
        let mut buf = [0u8; 8];

        source.close().await;

        assert_eq!(source.read_frame(&mut buf).await.unwrap(), FrameRead::Eof);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut source = make_source(vec![1u8; 8]);
        let handle = source.closed_handle();

        source.close().await;
        source.close().await;

        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_closed_handle_observes_close() {
        let mut source = make_source(vec![1u8; 8]);
        let handle = source.closed_handle();

        assert!(!handle.is_closed());
        source.close().await;
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_dropping_a_source_marks_it_closed() {
        let source = make_source(vec![1u8; 8]);
        let handle = source.closed_handle();

        drop(source);

        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_open_reads_an_artifact_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("artifact.pcm");
        tokio::fs::write(&path, vec![3u8; 8]).await.unwrap();

        let mut source = TrackSource::open(&path).await.unwrap();
        let mut buf = [0u8; 8];

        assert_eq!(source.read_frame(&mut buf).await.unwrap(), FrameRead::Frame);
        assert_eq!(buf, [3u8; 8]);
        assert_eq!(source.read_frame(&mut buf).await.unwrap(), FrameRead::Eof);
    }

    #[tokio::test]
    async fn test_open_fails_for_a_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("no-such-artifact.pcm");

        assert!(TrackSource::open(&path).await.is_err());
    }
}
