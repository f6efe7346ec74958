use std::os::raw::c_char;
use std::slice;

/// Position of the first `needle` that lies entirely within the first `limit` bytes of
/// `haystack`. An empty needle matches at 0.
pub fn find_bounded(haystack: &[u8], needle: &[u8], limit: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    let window = &haystack[..haystack.len().min(limit)];
    if needle.len() > window.len() {
        return None;
    }
    window
        .windows(needle.len())
        .position(|candidate| candidate == needle)
}

/// Bytes of a NUL-terminated C string, reading at most `max` bytes.
///
/// # Safety
/// - `ptr` must be null or point to memory readable up to the first NUL or `max` bytes,
///   whichever comes first.
pub unsafe fn c_bytes_bounded<'a>(ptr: *const c_char, max: usize) -> &'a [u8] {
    if ptr.is_null() {
        return &[];
    }
    let len = libc::strnlen(ptr, max);
    slice::from_raw_parts(ptr as *const u8, len)
}
