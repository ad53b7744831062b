use crate::input::InputFile;

/// A line-aligned chunk of one input file, the unit of work of a map task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    id: usize,
    source: String,
    offset: u64,
    data: Vec<u8>,
}

/// One line of input. `key` is the byte offset of the line within its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub key: u64,
    pub text: &'a str,
}

impl Split {
    pub fn new(id: usize, source: &str, offset: u64, data: Vec<u8>) -> Self {
        Split {
            id,
            source: source.to_string(),
            offset,
            data,
        }
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    pub fn get_source(&self) -> &str {
        &self.source
    }

    pub fn get_offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn records(&self) -> Result<Records<'_>, std::str::Utf8Error> {
        let text = std::str::from_utf8(&self.data)?;
        Ok(Records {
            lines: text.split_inclusive('\n'),
            offset: self.offset,
        })
    }
}

pub struct Records<'a> {
    lines: std::str::SplitInclusive<'a, char>,
    offset: u64,
}

impl<'a> Iterator for Records<'a> {
    type Item = Record<'a>;

    fn next(&mut self) -> Option<Record<'a>> {
        let line = self.lines.next()?;
        let key = self.offset;
        self.offset += line.len() as u64;
        let text = line.strip_suffix('\n').unwrap_or(line);
        let text = text.strip_suffix('\r').unwrap_or(text);
        Some(Record { key, text })
    }
}

/// Cuts input files into splits of at most `max_split_size` bytes, always at
/// a line boundary. A line longer than the limit becomes a split of its own.
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    max_split_size: usize,
}

impl Splitter {
    pub fn new(max_split_size: usize) -> Self {
        Splitter {
            max_split_size: max_split_size.max(1),
        }
    }

    /// Split ids continue from `first_id` so that ids stay unique across files.
    pub fn split(&self, file: &InputFile, first_id: usize) -> Vec<Split> {
        let mut splits = vec![];
        let mut start = 0usize;
        let mut end = 0usize;

        for line in file.data.split_inclusive(|b| *b == b'\n') {
            if end > start && end - start + line.len() > self.max_split_size {
                splits.push(self.cut(file, first_id + splits.len(), start, end));
                start = end;
            }
            end += line.len();
        }
        if end > start {
            splits.push(self.cut(file, first_id + splits.len(), start, end));
        }

        tracing::debug!(
            "split {} ({} bytes) into {} chunk(s)",
            file.name,
            file.data.len(),
            splits.len()
        );
        splits
    }

    fn cut(&self, file: &InputFile, id: usize, start: usize, end: usize) -> Split {
        Split::new(id, &file.name, start as u64, file.data[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(text: &str) -> InputFile {
        InputFile::new("f.txt", text.as_bytes())
    }

    #[test]
    fn test_split_respects_size_and_lines() {
        let input = file("aaa\nbb\ncccc\nd\n");
        let splits = Splitter::new(7).split(&input, 0);

        let chunks: Vec<&[u8]> = splits.iter().map(|s| s.data.as_slice()).collect();
        assert_eq!(chunks, vec![b"aaa\nbb\n".as_slice(), b"cccc\nd\n".as_slice()]);
        for split in &splits {
            assert!(split.len() <= 7);
            assert!(split.data.ends_with(b"\n"));
        }
        assert_eq!(splits[1].get_offset(), 7);
    }

    #[test]
    fn test_split_long_line_stays_whole() {
        let input = file("short\nthis line is longer than the limit\nx");
        let splits = Splitter::new(8).split(&input, 3);

        assert_eq!(splits.len(), 3);
        assert_eq!(splits[1].data, b"this line is longer than the limit\n");
        assert_eq!(splits[2].data, b"x");
        let ids: Vec<usize> = splits.iter().map(|s| s.get_id()).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn test_split_empty_file() {
        assert!(Splitter::new(10).split(&file(""), 0).is_empty());
    }

    #[test]
    fn test_split_concatenation_is_lossless() {
        let text = "one two\nthree\n\nfour five six\r\nseven";
        let splits = Splitter::new(5).split(&file(text), 0);
        let joined: Vec<u8> = splits.iter().flat_map(|s| s.data.clone()).collect();
        assert_eq!(joined, text.as_bytes());
    }

    #[test]
    fn test_records_keys_are_source_offsets() {
        let splits = Splitter::new(100).split(&file("ab\r\ncd\n\nef"), 0);
        let records: Vec<Record> = splits[0].records().unwrap().collect();
        assert_eq!(
            records,
            vec![
                Record { key: 0, text: "ab" },
                Record { key: 4, text: "cd" },
                Record { key: 7, text: "" },
                Record { key: 8, text: "ef" },
            ]
        );

        let splits = Splitter::new(4).split(&file("ab\ncd\n"), 0);
        let second: Vec<Record> = splits[1].records().unwrap().collect();
        assert_eq!(second, vec![Record { key: 3, text: "cd" }]);
    }

    #[test]
    fn test_records_reject_invalid_utf8() {
        let split = Split::new(0, "bad", 0, vec![b'o', b'k', b'\n', 0xff, 0xfe]);
        assert!(split.records().is_err());
    }
}
