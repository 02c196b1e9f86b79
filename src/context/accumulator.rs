//! Append-only response buffer filled by handlers.

use bytes::Bytes;

use crate::error::{RestError, RestResult};

/// What the accumulated bytes represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    /// Nothing was written.
    #[default]
    None,
    /// A structured (JSON) document.
    Json,
    /// A raw file to be sent as an attachment.
    File,
}

/// Growable output buffer for a single dispatch.
///
/// Every successful write appends and sets the kind to that of the write.
/// The file description is recorded by the first [`write_file`](Self::write_file)
/// and kept for the accumulator's lifetime.
///
/// # Examples
///
/// ```
/// use agentrest::context::{Accumulator, ContentKind};
///
/// let mut out = Accumulator::new();
/// out.write(b"{\"id\":").unwrap();
/// out.write(b"42}").unwrap();
/// assert_eq!(out.as_bytes(), b"{\"id\":42}");
/// assert_eq!(out.kind(), ContentKind::Json);
/// ```
#[derive(Debug, Default)]
pub struct Accumulator {
    buf: Vec<u8>,
    kind: ContentKind,
    description: Option<String>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Appends a chunk of a JSON document.
    ///
    /// # Errors
    ///
    /// - [`RestError::InvalidArgument`] if `data` is empty.
    /// - [`RestError::AllocationFailure`] if the buffer cannot grow; content
    ///   written by earlier calls is left in place.
    pub fn write(&mut self, data: &[u8]) -> RestResult<()> {
        if data.is_empty() {
            return Err(RestError::invalid("empty write"));
        }
        self.append(data)?;
        self.kind = ContentKind::Json;
        Ok(())
    }

    /// Appends a chunk of a file named `name`.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write), plus [`RestError::InvalidArgument`]
    /// for an empty `name` or one holding `"` or control characters, which
    /// could not be carried in a `Content-Disposition` header.
    pub fn write_file(&mut self, name: &str, data: &[u8]) -> RestResult<()> {
        if name.is_empty() {
            return Err(RestError::invalid("empty file name"));
        }
        if name.chars().any(|c| c == '"' || c.is_control()) {
            return Err(RestError::invalid(format!("file name {name:?} cannot be quoted")));
        }
        if data.is_empty() {
            return Err(RestError::invalid("empty write"));
        }
        self.append(data)?;
        self.kind = ContentKind::File;
        if self.description.is_none() {
            self.description = Some(name.to_owned());
        }
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> RestResult<()> {
        self.buf.try_reserve(data.len())?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    /// File name recorded by the first `write_file`, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the accumulator, returning kind, content, and the
    /// description (only reported for file content).
    pub(crate) fn finish(self) -> (ContentKind, Bytes, Option<String>) {
        let description = match self.kind {
            ContentKind::File => self.description,
            _ => None,
        };
        (self.kind, Bytes::from(self.buf), description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let out = Accumulator::new();
        assert!(out.is_empty());
        assert_eq!(out.kind(), ContentKind::None);
        assert_eq!(out.description(), None);
    }

    #[test]
    fn writes_concatenate_in_call_order() {
        let mut out = Accumulator::new();
        let chunks: [&[u8]; 4] = [b"[", b"1,", b"2,3", b"]"];
        for chunk in chunks {
            out.write(chunk).unwrap();
        }
        assert_eq!(out.len(), chunks.iter().map(|c| c.len()).sum::<usize>());
        assert_eq!(out.as_bytes(), b"[1,2,3]");
    }

    #[test]
    fn empty_write_is_rejected_and_changes_nothing() {
        let mut out = Accumulator::new();
        assert!(matches!(out.write(b""), Err(RestError::InvalidArgument(_))));
        assert_eq!(out.kind(), ContentKind::None);
        assert!(matches!(
            out.write_file("a.txt", b""),
            Err(RestError::InvalidArgument(_))
        ));
        assert!(matches!(
            out.write_file("", b"x"),
            Err(RestError::InvalidArgument(_))
        ));
        assert!(out.is_empty());
        assert_eq!(out.description(), None);
    }

    #[test]
    fn file_name_must_fit_in_a_header() {
        let mut out = Accumulator::new();
        for bad in ["a\"b.txt", "a.txt\r\nSet-Cookie: x=1", "a\nb", "tab\tname"] {
            assert!(
                matches!(out.write_file(bad, b"x"), Err(RestError::InvalidArgument(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(out.is_empty());
        assert_eq!(out.kind(), ContentKind::None);
        assert_eq!(out.description(), None);
        out.write_file("report 2024-01.json", b"x").unwrap();
        assert_eq!(out.description(), Some("report 2024-01.json"));
    }

    #[test]
    fn capacity_grows_and_never_shrinks() {
        let mut out = Accumulator::with_capacity(4);
        assert!(out.capacity() >= 4);
        let mut last = out.capacity();
        for _ in 0..64 {
            out.write(b"0123456789").unwrap();
            assert!(out.len() <= out.capacity());
            assert!(out.capacity() >= last);
            last = out.capacity();
        }
        assert_eq!(out.len(), 640);
    }

    #[test]
    fn first_file_name_wins() {
        let mut out = Accumulator::new();
        out.write_file("first.log", b"abc").unwrap();
        out.write_file("second.log", b"def").unwrap();
        assert_eq!(out.description(), Some("first.log"));
        assert_eq!(out.as_bytes(), b"abcdef");
        assert_eq!(out.kind(), ContentKind::File);
    }

    #[test]
    fn kind_follows_most_recent_write() {
        let mut out = Accumulator::new();
        out.write(b"{").unwrap();
        out.write_file("dump.bin", b"x").unwrap();
        assert_eq!(out.kind(), ContentKind::File);
        out.write(b"}").unwrap();
        assert_eq!(out.kind(), ContentKind::Json);
        assert_eq!(out.as_bytes(), b"{x}");
    }

    #[test]
    fn finish_reports_description_only_for_files() {
        let mut out = Accumulator::new();
        out.write_file("dump.bin", b"x").unwrap();
        out.write(b"y").unwrap();
        let (kind, content, description) = out.finish();
        assert_eq!(kind, ContentKind::Json);
        assert_eq!(content.as_ref(), b"xy");
        assert_eq!(description, None);

        let mut out = Accumulator::new();
        out.write_file("dump.bin", b"x").unwrap();
        let (kind, _, description) = out.finish();
        assert_eq!(kind, ContentKind::File);
        assert_eq!(description.as_deref(), Some("dump.bin"));
    }
}
