use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const READ_BUFFER_CAPACITY: usize = 1 << 20;
const MAX_FORWARD_SKIP: u64 = 64 << 10;

/// The bytes of one game record together with where they were found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Byte offset of the first line of the record.
    pub offset: u64,
    /// Byte offset just past the last line of the record.
    pub end: u64,
    pub bytes: Vec<u8>,
}

impl RawRecord {
    /// Value of the first `[name "value"]` header with the given name.
    pub fn header(&self, name: &str) -> Option<String> {
        self.bytes
            .split(|&b| b == b'\n')
            .map(|line| line.trim_ascii())
            .take_while(|line| line.first() == Some(&b'['))
            .find_map(|line| parse_header_line(line, name))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn parse_header_line(line: &[u8], name: &str) -> Option<String> {
    let inner = line.strip_prefix(b"[")?.strip_suffix(b"]")?;
    let split = inner.iter().position(u8::is_ascii_whitespace)?;
    let (key, value) = inner.split_at(split);
    if key != name.as_bytes() {
        return None;
    }
    let value = value.trim_ascii();
    let value = value.strip_prefix(b"\"").unwrap_or(value);
    let value = value.strip_suffix(b"\"").unwrap_or(value);
    Some(String::from_utf8_lossy(value).into_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Start,
    Headers,
    BeforeMoves,
    Moves,
}

/// Splits a PGN stream into raw game records, one at a time, while tracking byte offsets.
///
/// A record is an optional block of header lines followed by movetext. The movetext ends at
/// a blank line outside a `{}` comment, at a line starting with `[`, or at end of input.
pub struct RecordReader<R> {
    reader: R,
    offset: u64,
    pending: Option<(u64, Vec<u8>)>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> RecordReader<R> {
        RecordReader::with_offset(reader, 0)
    }

    /// Wraps a reader that is already positioned at `offset` in its underlying stream.
    pub fn with_offset(reader: R, offset: u64) -> RecordReader<R> {
        RecordReader { reader, offset, pending: None }
    }

    /// Offset of the next byte this reader will look at.
    pub fn offset(&self) -> u64 {
        match &self.pending {
            Some((offset, _)) => *offset,
            None => self.offset,
        }
    }

    fn next_line(&mut self) -> io::Result<Option<(u64, Vec<u8>)>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut line = Vec::new();
        let start = self.offset;
        let n = self.reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(None);
        }
        self.offset += n as u64;
        Ok(Some((start, line)))
    }

    pub fn read_record(&mut self) -> io::Result<Option<RawRecord>> {
        let mut state = RecordState::Start;
        let mut bytes = Vec::new();
        let mut start = 0;
        let mut end = 0;
        let mut in_comment = false;

        while let Some((line_offset, line)) = self.next_line()? {
            let trimmed = line.trim_ascii();
            let blank = trimmed.is_empty();
            let opens_header = line.first() == Some(&b'[');

            match state {
                RecordState::Start => {
                    if blank {
                        continue;
                    }
                    start = line_offset;
                    state = if opens_header { RecordState::Headers } else { RecordState::Moves };
                }
                RecordState::Headers => {
                    if blank {
                        state = RecordState::BeforeMoves;
                    } else if !opens_header {
                        state = RecordState::Moves;
                    }
                }
                RecordState::BeforeMoves => {
                    if opens_header {
                        // header-only record, the next one starts here
                        self.pending = Some((line_offset, line));
                        break;
                    }
                    if !blank {
                        state = RecordState::Moves;
                    }
                }
                RecordState::Moves => {
                    if !in_comment && blank {
                        break;
                    }
                    if !in_comment && opens_header {
                        self.pending = Some((line_offset, line));
                        break;
                    }
                }
            }

            if state == RecordState::Moves {
                in_comment = scan_comments(&line, in_comment);
            }
            end = line_offset + line.len() as u64;
            bytes.extend_from_slice(&line);
        }

        if state == RecordState::Start {
            return Ok(None);
        }
        Ok(Some(RawRecord { offset: start, end, bytes }))
    }
}

impl<R: BufRead + Seek> RecordReader<R> {
    /// Moves to `offset` in the underlying stream. Staying put or skipping a short distance
    /// forward reuses the buffered data; anything else seeks.
    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if self.offset() == offset {
            return Ok(());
        }
        self.pending = None;
        if offset >= self.offset && offset - self.offset <= MAX_FORWARD_SKIP {
            let gap = offset - self.offset;
            let skipped = io::copy(&mut (&mut self.reader).take(gap), &mut io::sink())?;
            self.offset += skipped;
            if skipped == gap {
                return Ok(());
            }
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }
}

impl RecordReader<BufReader<File>> {
    /// Opens an archive and positions the reader at `offset`.
    pub fn open_at<P: AsRef<Path>>(path: P, offset: u64) -> io::Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(RecordReader::with_offset(BufReader::with_capacity(READ_BUFFER_CAPACITY, file), offset))
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = io::Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Returns whether a brace comment is still open at the end of the line.
fn scan_comments(line: &[u8], mut in_comment: bool) -> bool {
    for &b in line {
        match (in_comment, b) {
            (true, b'}') => in_comment = false,
            (false, b'{') => in_comment = true,
            (false, b';') => break,
            _ => {}
        }
    }
    in_comment
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io::{Cursor, Write};
    use std::rc::Rc;
    use super::*;

    fn records(text: &str) -> Vec<RawRecord> {
        RecordReader::new(Cursor::new(text.as_bytes()))
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    fn text(record: &RawRecord) -> &str {
        std::str::from_utf8(&record.bytes).unwrap()
    }

    #[test]
    fn test_two_games_with_offsets() {
        let first = "[Event \"a\"]\n[Result \"1-0\"]\n\n1. e4 e5 1-0\n\n";
        let second = "[Event \"b\"]\n[Result \"0-1\"]\n\n1. d4 d5 0-1\n";
        let input = format!("{first}{second}");

        let records = records(&input);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 0);
        assert_eq!(records[1].offset, first.len() as u64);
        assert_eq!(&input[records[1].offset as usize..], second);
        assert_eq!(records[0].header("Event").as_deref(), Some("a"));
        assert_eq!(records[1].header("Result").as_deref(), Some("0-1"));
    }

    #[test]
    fn test_leading_blank_lines_are_skipped() {
        let input = "\n\n\n[Event \"a\"]\n\n1. e4 *\n";
        let records = records(input);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].offset, 3);
        assert!(text(&records[0]).starts_with("[Event"));
    }

    #[test]
    fn test_blank_line_inside_comment_does_not_end_record() {
        let input = "[Event \"a\"]\n\n1. e4 { a long\n\ncomment } e5 2. Nf3 *\n\n[Event \"b\"]\n\n1. d4 *\n";
        let records = records(input);
        assert_eq!(records.len(), 2);
        assert!(text(&records[0]).contains("Nf3"));
        assert_eq!(records[1].header("Event").as_deref(), Some("b"));
    }

    #[test]
    fn test_brace_in_line_comment_is_ignored() {
        let input = "1. e4 ; not a { comment\n\n1. d4 *\n";
        let records = records(input);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_header_line_ends_movetext() {
        let input = "[Event \"a\"]\n\n1. e4 *\n[Event \"b\"]\n\n1. d4 *\n";
        let records = records(input);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].offset, input.find("[Event \"b\"]").unwrap() as u64);
    }

    #[test]
    fn test_header_only_record() {
        let input = "[Event \"a\"]\n[Result \"*\"]\n\n[Event \"b\"]\n\n1. d4 *\n";
        let records = records(input);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].header("Event").as_deref(), Some("a"));
        assert!(!text(&records[0]).contains("d4"));
    }

    #[test]
    fn test_movetext_without_headers() {
        let input = "1. e4 e5 2. Nf3 *\n";
        let records = records(input);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header("Event"), None);
        assert_eq!(records[0].end, input.len() as u64);
    }

    #[test]
    fn test_crlf_line_endings() {
        let input = "[Event \"a\"]\r\n\r\n1. e4 *\r\n\r\n[Event \"b\"]\r\n\r\n1. d4 *\r\n";
        let records = records(input);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].header("Event").as_deref(), Some("a"));
    }

    #[test]
    fn test_empty_input() {
        assert!(records("").is_empty());
        assert!(records("\n\n  \n").is_empty());
    }

    /// Counts the bytes pulled from the wrapped stream.
    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        bytes_read: Rc<Cell<u64>>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.bytes_read.set(self.bytes_read.get() + n as u64);
            Ok(n)
        }
    }

    impl Seek for CountingReader {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    fn many_games(count: usize) -> String {
        (0..count)
            .map(|i| format!("[Event \"{i}\"]\n[Result \"*\"]\n\n1. e4 e5 2. Nf3 Nc6 *\n\n"))
            .collect()
    }

    fn counting_reader(text: &str) -> (RecordReader<BufReader<CountingReader>>, Rc<Cell<u64>>) {
        let bytes_read = Rc::new(Cell::new(0));
        let inner = CountingReader {
            inner: Cursor::new(text.as_bytes().to_vec()),
            bytes_read: bytes_read.clone(),
        };
        (RecordReader::new(BufReader::with_capacity(4096, inner)), bytes_read)
    }

    #[test]
    fn test_seeking_to_each_record_in_order_reads_input_once() {
        let text = many_games(500);
        let offsets: Vec<u64> = records(&text).iter().map(|r| r.offset).collect();
        assert_eq!(offsets.len(), 500);

        let (mut reader, bytes_read) = counting_reader(&text);
        for (i, &offset) in offsets.iter().enumerate() {
            reader.seek_to(offset).unwrap();
            let record = reader.read_record().unwrap().unwrap();
            assert_eq!(record.offset, offset);
            assert_eq!(record.header("Event"), Some(i.to_string()));
        }
        assert!(bytes_read.get() <= text.len() as u64, "read {} of {} bytes", bytes_read.get(), text.len());
    }

    #[test]
    fn test_short_forward_skip_reuses_buffer() {
        let text = many_games(500);
        let offsets: Vec<u64> = records(&text).iter().map(|r| r.offset).collect();

        let (mut reader, bytes_read) = counting_reader(&text);
        for &offset in offsets.iter().step_by(3) {
            reader.seek_to(offset).unwrap();
            assert_eq!(reader.read_record().unwrap().unwrap().offset, offset);
        }
        assert!(bytes_read.get() <= text.len() as u64);
    }

    #[test]
    fn test_seek_backwards() {
        let text = many_games(10);
        let offsets: Vec<u64> = records(&text).iter().map(|r| r.offset).collect();

        let (mut reader, _) = counting_reader(&text);
        reader.seek_to(offsets[7]).unwrap();
        assert_eq!(reader.read_record().unwrap().unwrap().header("Event").as_deref(), Some("7"));
        reader.seek_to(offsets[2]).unwrap();
        assert_eq!(reader.read_record().unwrap().unwrap().header("Event").as_deref(), Some("2"));
        assert_eq!(reader.read_record().unwrap().unwrap().header("Event").as_deref(), Some("3"));
    }

    #[test]
    fn test_seek_past_pending_header_line() {
        let input = "[Event \"a\"]\n\n1. e4 *\n[Event \"b\"]\n\n1. d4 *\n[Event \"c\"]\n\n1. c4 *\n";
        let (mut reader, _) = counting_reader(input);
        reader.read_record().unwrap().unwrap();
        // the header of "b" is already held back as the next line
        let c = input.find("[Event \"c\"]").unwrap() as u64;
        reader.seek_to(c).unwrap();
        let record = reader.read_record().unwrap().unwrap();
        assert_eq!(record.offset, c);
        assert_eq!(record.header("Event").as_deref(), Some("c"));
    }

    #[test]
    fn test_open_at_offset() {
        let first = "[Event \"a\"]\n\n1. e4 *\n\n";
        let second = "[Event \"b\"]\n\n1. d4 d5 *\n";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{first}{second}").unwrap();

        let mut reader = RecordReader::open_at(file.path(), first.len() as u64).unwrap();
        let record = reader.read_record().unwrap().unwrap();
        assert_eq!(record.offset, first.len() as u64);
        assert_eq!(record.header("Event").as_deref(), Some("b"));
        assert!(reader.read_record().unwrap().is_none());
    }
}
