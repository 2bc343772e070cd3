//! Один сегментный файл: chunk-фрейминг записей, point-read по Position.

use byteorder::{ByteOrder, LittleEndian};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::{Error, Result};

use super::{
    segment_file_name, Position, SegmentId, BLOCK_SIZE, CHUNK_HEADER_SIZE, CHUNK_TYPE_FIRST,
    CHUNK_TYPE_FULL, CHUNK_TYPE_LAST, CHUNK_TYPE_MIDDLE,
};

pub struct Segment {
    id: SegmentId,
    path: PathBuf,
    inner: Mutex<SegmentFile>,
}

struct SegmentFile {
    file: File,
    size: u64,
}

impl Segment {
    /// Открыть (создать при отсутствии) сегмент `id` в каталоге `dir`.
    pub fn open(dir: &Path, suffix: &str, id: SegmentId) -> Result<Segment> {
        let path = segment_file_name(dir, suffix, id);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        Ok(Segment {
            id,
            path,
            inner: Mutex::new(SegmentFile { file, size }),
        })
    }

    #[inline]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.inner.lock().unwrap().size
    }

    /// Закодировать запись в чанки от текущего конца файла и дописать их
    /// одним write-вызовом. Возвращает позицию записи.
    pub fn append(&self, data: &[u8]) -> Result<Position> {
        let mut inner = self.inner.lock().unwrap();
        let cur_size = inner.size;
        let (frame, start, end) = build_frames(data, cur_size);
        inner.file.seek(SeekFrom::Start(cur_size))?;
        inner.file.write_all(&frame)?;
        inner.size = end;
        Ok(Position {
            segment_id: self.id,
            block_number: (start / BLOCK_SIZE) as u32,
            chunk_offset: start,
            chunk_size: (end - start) as u32,
        })
    }

    /// Сколько байт на диске займёт запись, добавленная следующей.
    pub fn encoded_len(&self, data_len: usize) -> u64 {
        let size = self.inner.lock().unwrap().size;
        frames_span(data_len, size)
    }

    /// Прочитать ровно одну запись по позиции, проверяя CRC каждого чанка.
    pub fn read(&self, pos: &Position) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        if pos.chunk_offset >= inner.size {
            return Err(Error::Corrupted("record position past end of segment"));
        }
        inner.file.seek(SeekFrom::Start(pos.chunk_offset))?;
        let mut offset = pos.chunk_offset;
        let mut value = Vec::new();
        loop {
            let block_rest = BLOCK_SIZE - offset % BLOCK_SIZE;
            if block_rest <= CHUNK_HEADER_SIZE {
                // block tail is zero padding; the next chunk starts at the
                // block boundary
                inner.file.seek(SeekFrom::Current(block_rest as i64))?;
                offset += block_rest;
                continue;
            }
            let mut header = [0u8; CHUNK_HEADER_SIZE as usize];
            inner.file.read_exact(&mut header)?;
            let stored_crc = LittleEndian::read_u32(&header[0..4]);
            let length = LittleEndian::read_u16(&header[4..6]) as usize;
            let chunk_type = header[6];
            let mut payload = vec![0u8; length];
            inner.file.read_exact(&mut payload)?;
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&header[4..7]);
            hasher.update(&payload);
            if hasher.finalize() != stored_crc {
                return Err(Error::Corrupted("chunk checksum mismatch"));
            }
            offset += CHUNK_HEADER_SIZE + length as u64;
            value.extend_from_slice(&payload);
            match chunk_type {
                CHUNK_TYPE_FULL | CHUNK_TYPE_LAST => return Ok(value),
                CHUNK_TYPE_FIRST | CHUNK_TYPE_MIDDLE => continue,
                _ => return Err(Error::Corrupted("unknown chunk type")),
            }
        }
    }

    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        inner.file.sync_all()?;
        Ok(())
    }
}

/// Разрезать запись на чанки начиная с файлового смещения `start_offset`.
///
/// Возвращает (кадры с нулевым паддингом в начале, смещение первого
/// заголовка, смещение конца последнего чанка).
fn build_frames(data: &[u8], start_offset: u64) -> (Vec<u8>, u64, u64) {
    let mut frame = Vec::with_capacity(data.len() + 2 * CHUNK_HEADER_SIZE as usize);
    let mut offset = start_offset;

    // a block tail shorter than a chunk header can never hold a chunk
    let head_rest = BLOCK_SIZE - offset % BLOCK_SIZE;
    if head_rest <= CHUNK_HEADER_SIZE {
        frame.resize(head_rest as usize, 0);
        offset += head_rest;
    }
    let record_start = offset;

    let mut written = 0usize;
    loop {
        let block_rest = BLOCK_SIZE - offset % BLOCK_SIZE;
        if block_rest <= CHUNK_HEADER_SIZE {
            frame.resize(frame.len() + block_rest as usize, 0);
            offset += block_rest;
            continue;
        }
        let capacity = (block_rest - CHUNK_HEADER_SIZE) as usize;
        let remaining = data.len() - written;
        let take = remaining.min(capacity);
        let chunk_type = if written == 0 && take == data.len() {
            CHUNK_TYPE_FULL
        } else if written == 0 {
            CHUNK_TYPE_FIRST
        } else if written + take == data.len() {
            CHUNK_TYPE_LAST
        } else {
            CHUNK_TYPE_MIDDLE
        };
        let payload = &data[written..written + take];
        let mut header = [0u8; CHUNK_HEADER_SIZE as usize];
        LittleEndian::write_u16(&mut header[4..6], take as u16);
        header[6] = chunk_type;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header[4..7]);
        hasher.update(payload);
        LittleEndian::write_u32(&mut header[0..4], hasher.finalize());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(payload);
        offset += CHUNK_HEADER_SIZE + take as u64;
        written += take;
        if written == data.len() {
            return (frame, record_start, offset);
        }
    }
}

/// Размер на диске записи длиной `data_len`, добавленной при размере файла
/// `start_offset` (включая паддинг в начале).
pub(crate) fn frames_span(data_len: usize, start_offset: u64) -> u64 {
    let mut offset = start_offset;
    let head_rest = BLOCK_SIZE - offset % BLOCK_SIZE;
    if head_rest <= CHUNK_HEADER_SIZE {
        offset += head_rest;
    }
    let mut written = 0usize;
    loop {
        let block_rest = BLOCK_SIZE - offset % BLOCK_SIZE;
        if block_rest <= CHUNK_HEADER_SIZE {
            offset += block_rest;
            continue;
        }
        let capacity = (block_rest - CHUNK_HEADER_SIZE) as usize;
        let take = (data_len - written).min(capacity);
        offset += CHUNK_HEADER_SIZE + take as u64;
        written += take;
        if written == data_len {
            return offset - start_offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "kestrel-seg-{}-{}-{}",
            tag,
            std::process::id(),
            crate::util::now_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn append_and_read_small_records() {
        let dir = temp_dir("small");
        let seg = Segment::open(&dir, ".SEG", 1).unwrap();
        let a = seg.append(b"alpha").unwrap();
        let b = seg.append(b"beta").unwrap();
        assert_eq!(seg.read(&a).unwrap(), b"alpha");
        assert_eq!(seg.read(&b).unwrap(), b"beta");
        assert_eq!(a.block_number, 0);
        assert!(b.chunk_offset > a.chunk_offset);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn append_and_read_record_spanning_blocks() {
        let dir = temp_dir("span");
        let seg = Segment::open(&dir, ".SEG", 1).unwrap();
        let big: Vec<u8> = (0..(3 * BLOCK_SIZE as usize + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        let pos = seg.append(&big).unwrap();
        assert_eq!(seg.read(&pos).unwrap(), big);
        assert!(pos.chunk_size as u64 > 3 * BLOCK_SIZE);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn block_tail_is_padded() {
        let dir = temp_dir("pad");
        let seg = Segment::open(&dir, ".SEG", 1).unwrap();
        // leave fewer than CHUNK_HEADER_SIZE bytes in the first block
        let filler = vec![7u8; BLOCK_SIZE as usize - CHUNK_HEADER_SIZE as usize - 3];
        let first = seg.append(&filler).unwrap();
        let second = seg.append(b"next-block").unwrap();
        assert_eq!(second.block_number, 1);
        assert_eq!(second.chunk_offset % BLOCK_SIZE, 0);
        assert_eq!(seg.read(&first).unwrap(), filler);
        assert_eq!(seg.read(&second).unwrap(), b"next-block");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupted_chunk_is_detected() {
        let dir = temp_dir("crc");
        let seg = Segment::open(&dir, ".SEG", 1).unwrap();
        let pos = seg.append(b"to-be-flipped").unwrap();
        let path = seg.path().to_path_buf();
        drop(seg);
        let mut raw = std::fs::read(&path).unwrap();
        let target = pos.chunk_offset as usize + CHUNK_HEADER_SIZE as usize;
        raw[target] ^= 0xFF;
        std::fs::write(&path, &raw).unwrap();
        let seg = Segment::open(&dir, ".SEG", 1).unwrap();
        assert!(matches!(seg.read(&pos), Err(Error::Corrupted(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn frames_span_matches_append() {
        let dir = temp_dir("est");
        let seg = Segment::open(&dir, ".SEG", 1).unwrap();
        for len in [0usize, 1, 100, BLOCK_SIZE as usize, 2 * BLOCK_SIZE as usize + 5] {
            let before = seg.size();
            let estimated = seg.encoded_len(len);
            seg.append(&vec![3u8; len]).unwrap();
            assert_eq!(seg.size() - before, estimated);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
