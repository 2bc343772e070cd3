//! Последовательное чтение всех записей лога в порядке сегментов.
//!
//! Reader открывает собственные файловые дескрипторы, поэтому не мешает
//! параллельным append'ам; он видит состояние сегментов на момент создания.

use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::errors::{Error, Result};

use super::{
    Position, SegmentId, BLOCK_SIZE, CHUNK_HEADER_SIZE, CHUNK_TYPE_FIRST, CHUNK_TYPE_FULL,
    CHUNK_TYPE_LAST, CHUNK_TYPE_MIDDLE,
};

pub struct LogReader {
    files: Vec<(SegmentId, PathBuf)>,
    next_file: usize,
    current: Option<SegmentReader>,
}

struct SegmentReader {
    id: SegmentId,
    file: BufReader<File>,
    offset: u64,
    size: u64,
}

impl LogReader {
    pub(crate) fn new(mut files: Vec<(SegmentId, PathBuf)>) -> LogReader {
        files.sort_by_key(|(id, _)| *id);
        LogReader {
            files,
            next_file: 0,
            current: None,
        }
    }

    /// Сегмент, из которого будет прочитана следующая запись; None, когда
    /// лог исчерпан.
    pub fn current_segment_id(&mut self) -> Option<SegmentId> {
        loop {
            if let Some(cur) = &self.current {
                return Some(cur.id);
            }
            if !self.advance() {
                return None;
            }
        }
    }

    /// Пропустить остаток текущего сегмента.
    pub fn skip_current_segment(&mut self) {
        self.current = None;
    }

    /// Следующая запись с её позицией. `Err(Corrupted)` — обрыв или битый
    /// чанк (например, хвост после падения процесса); решение — за
    /// вызывающим кодом.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Result<(Vec<u8>, Position)>> {
        loop {
            if self.current.is_none() && !self.advance() {
                return None;
            }
            let cur = self.current.as_mut().unwrap();
            match cur.next() {
                Some(item) => return Some(item),
                None => self.current = None,
            }
        }
    }

    fn advance(&mut self) -> bool {
        while self.next_file < self.files.len() {
            let (id, path) = &self.files[self.next_file];
            self.next_file += 1;
            match SegmentReader::open(*id, path) {
                Ok(reader) => {
                    self.current = Some(reader);
                    return true;
                }
                Err(_) => continue, // segment vanished (merge adoption); skip
            }
        }
        false
    }
}

impl SegmentReader {
    fn open(id: SegmentId, path: &PathBuf) -> Result<SegmentReader> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(SegmentReader {
            id,
            file: BufReader::new(file),
            offset: 0,
            size,
        })
    }

    fn next(&mut self) -> Option<Result<(Vec<u8>, Position)>> {
        // chunk assembly: Full, либо First..Middle*..Last
        let mut value = Vec::new();
        let mut start: Option<u64> = None;
        loop {
            let block_rest = BLOCK_SIZE - self.offset % BLOCK_SIZE;
            if block_rest <= CHUNK_HEADER_SIZE {
                if self.seek_forward(block_rest).is_err() {
                    return None;
                }
                continue;
            }
            if self.offset + CHUNK_HEADER_SIZE > self.size {
                return self.end_or_torn(start);
            }
            let mut header = [0u8; CHUNK_HEADER_SIZE as usize];
            if self.file.read_exact(&mut header).is_err() {
                return self.end_or_torn(start);
            }
            let stored_crc = LittleEndian::read_u32(&header[0..4]);
            let length = LittleEndian::read_u16(&header[4..6]) as usize;
            let chunk_type = header[6];
            if self.offset + CHUNK_HEADER_SIZE + length as u64 > self.size {
                return Some(Err(Error::Corrupted("chunk payload past end of segment")));
            }
            let mut payload = vec![0u8; length];
            if self.file.read_exact(&mut payload).is_err() {
                return Some(Err(Error::Corrupted("chunk payload truncated")));
            }
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&header[4..7]);
            hasher.update(&payload);
            if hasher.finalize() != stored_crc {
                return Some(Err(Error::Corrupted("chunk checksum mismatch")));
            }
            if start.is_none() {
                start = Some(self.offset);
            }
            self.offset += CHUNK_HEADER_SIZE + length as u64;
            value.extend_from_slice(&payload);
            match chunk_type {
                CHUNK_TYPE_FULL | CHUNK_TYPE_LAST => {
                    let begin = start.unwrap();
                    return Some(Ok((
                        value,
                        Position {
                            segment_id: self.id,
                            block_number: (begin / BLOCK_SIZE) as u32,
                            chunk_offset: begin,
                            chunk_size: (self.offset - begin) as u32,
                        },
                    )));
                }
                CHUNK_TYPE_FIRST | CHUNK_TYPE_MIDDLE => continue,
                _ => return Some(Err(Error::Corrupted("unknown chunk type"))),
            }
        }
    }

    fn seek_forward(&mut self, bytes: u64) -> std::io::Result<()> {
        if self.offset + bytes > self.size {
            self.offset = self.size;
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        }
        self.file.seek(SeekFrom::Start(self.offset + bytes))?;
        self.offset += bytes;
        Ok(())
    }

    fn end_or_torn(&self, start: Option<u64>) -> Option<Result<(Vec<u8>, Position)>> {
        if start.is_some() {
            // запись началась, но её хвоста нет
            Some(Err(Error::Corrupted("record truncated mid-chunks")))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{LogOptions, SegmentLog};
    use super::*;

    fn log_opts(tag: &str, segment_size: u64) -> LogOptions {
        let dir = std::env::temp_dir().join(format!(
            "kestrel-rd-{}-{}-{}",
            tag,
            std::process::id(),
            crate::util::now_nanos()
        ));
        LogOptions {
            dir_path: dir,
            segment_size,
            segment_file_ext: ".SEG".to_string(),
            sync: false,
            bytes_per_sync: 0,
        }
    }

    #[test]
    fn reader_sees_records_in_log_order() {
        let opts = log_opts("order", 512);
        let log = SegmentLog::open(opts.clone()).unwrap();
        let mut expected = Vec::new();
        for i in 0..20u8 {
            let data = vec![i; 64];
            let pos = log.append(&data).unwrap();
            expected.push((data, pos));
        }
        let mut reader = log.reader();
        for (data, pos) in &expected {
            let (got, got_pos) = reader.next().unwrap().unwrap();
            assert_eq!(&got, data);
            assert_eq!(&got_pos, pos);
        }
        assert!(reader.next().is_none());
        let _ = std::fs::remove_dir_all(&opts.dir_path);
    }

    #[test]
    fn reader_with_max_excludes_newer_segments() {
        let opts = log_opts("max", 256);
        let log = SegmentLog::open(opts.clone()).unwrap();
        log.append(&vec![1u8; 200]).unwrap();
        log.append(&vec![2u8; 200]).unwrap(); // rotates into segment 2
        let mut reader = log.reader_with_max(1);
        let (got, pos) = reader.next().unwrap().unwrap();
        assert_eq!(got, vec![1u8; 200]);
        assert_eq!(pos.segment_id, 1);
        assert!(reader.next().is_none());
        let _ = std::fs::remove_dir_all(&opts.dir_path);
    }

    #[test]
    fn skip_current_segment_jumps_to_the_next() {
        let opts = log_opts("skip", 256);
        let log = SegmentLog::open(opts.clone()).unwrap();
        log.append(&vec![1u8; 200]).unwrap();
        log.append(&vec![2u8; 200]).unwrap();
        let mut reader = log.reader();
        assert_eq!(reader.current_segment_id(), Some(1));
        reader.skip_current_segment();
        let (got, _) = reader.next().unwrap().unwrap();
        assert_eq!(got, vec![2u8; 200]);
        let _ = std::fs::remove_dir_all(&opts.dir_path);
    }

    #[test]
    fn torn_tail_reports_corruption() {
        let opts = log_opts("torn", 1 << 20);
        let log = SegmentLog::open(opts.clone()).unwrap();
        log.append(b"whole-record").unwrap();
        let pos = log.append(b"cut-me-in-half").unwrap();
        drop(log);
        let path = super::super::segment_file_name(&opts.dir_path, ".SEG", 1);
        let raw = std::fs::read(&path).unwrap();
        let cut = pos.chunk_offset as usize + CHUNK_HEADER_SIZE as usize + 3;
        std::fs::write(&path, &raw[..cut]).unwrap();
        let log = SegmentLog::open(opts.clone()).unwrap();
        let mut reader = log.reader();
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next(), Some(Err(Error::Corrupted(_)))));
        let _ = std::fs::remove_dir_all(&opts.dir_path);
    }
}
