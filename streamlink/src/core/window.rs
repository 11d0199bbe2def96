/// Event-time window definition shared by the windowed aggregations and the
/// by-frame watermark emission policy.
///
/// A window of `window_length` slides by `frame_length`; a tumbling window is
/// the special case where both are equal. `frame_offset` shifts frame
/// boundaries off the epoch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WindowDefinition {
    frame_length: i64,
    frame_offset: i64,
    window_length: i64,
}

impl WindowDefinition {
    pub fn tumbling(frame_length: i64) -> Self {
        assert!(frame_length > 0, "frame length must be positive");
        WindowDefinition {
            frame_length,
            frame_offset: 0,
            window_length: frame_length,
        }
    }

    pub fn sliding(window_length: i64, slide_by: i64) -> Self {
        assert!(slide_by > 0, "slide must be positive");
        assert!(
            window_length >= slide_by && window_length % slide_by == 0,
            "window length must be a positive multiple of the slide"
        );
        WindowDefinition {
            frame_length: slide_by,
            frame_offset: 0,
            window_length,
        }
    }

    pub fn with_offset(mut self, frame_offset: i64) -> Self {
        self.frame_offset = frame_offset % self.frame_length;
        self
    }

    pub fn frame_length(&self) -> i64 {
        self.frame_length
    }

    pub fn frame_offset(&self) -> i64 {
        self.frame_offset
    }

    pub fn window_length(&self) -> i64 {
        self.window_length
    }

    pub fn is_tumbling(&self) -> bool {
        self.window_length == self.frame_length
    }

    /// The highest frame boundary not greater than `timestamp`.
    pub fn floor_frame_ts(&self, timestamp: i64) -> i64 {
        let rem = (timestamp - self.frame_offset).rem_euclid(self.frame_length);
        timestamp - rem
    }

    /// The lowest frame boundary greater than `timestamp`.
    pub fn higher_frame_ts(&self, timestamp: i64) -> i64 {
        self.floor_frame_ts(timestamp) + self.frame_length
    }
}
