//! Multipart part header for JPEG frames
//!
//! Every frame on the wire is a part header followed directly by the raw
//! JPEG bytes. The header opens with the boundary, so consecutive frames need
//! no closing delimiter.

use std::fmt::Write;
use std::time::Duration;

use bytes::BytesMut;

/// Boundary word separating parts of the multipart stream
pub const BOUNDARY: &str = "MJPEGBOUNDARY";

/// Value of the top-level `Content-Type` response header
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace;boundary=MJPEGBOUNDARY";

/// Content type of every individual part
pub const PART_CONTENT_TYPE: &str = "image/jpeg";

/// Format the part header for a JPEG payload of `jpeg_len` bytes taken
/// `elapsed` after the stream started.
pub fn frame_header(jpeg_len: usize, elapsed: Duration) -> String {
    let mut header = String::with_capacity(96);
    // Writing into a String cannot fail
    let _ = write!(
        header,
        "\r\n--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\nX-Timestamp: {}.{:06}\r\n\r\n",
        BOUNDARY,
        PART_CONTENT_TYPE,
        jpeg_len,
        elapsed.as_secs(),
        elapsed.subsec_micros(),
    );
    header
}

/// Build `header ++ jpeg` into `buf`.
///
/// `buf` is expected to be empty (the previous frame split off). When its
/// spare capacity cannot hold the new frame it is grown to twice the frame
/// size, so a steady stream of similarly sized frames settles into reusing
/// the same allocation.
pub(crate) fn encode_frame(buf: &mut BytesMut, jpeg: &[u8], elapsed: Duration) {
    let header = frame_header(jpeg.len(), elapsed);
    let needed = header.len() + jpeg.len();

    if buf.capacity() - buf.len() < needed {
        buf.reserve(needed * 2);
    }

    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(jpeg);
}
