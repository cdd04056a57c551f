//! Voice announcements
//!
//! Confirms XLX link changes to the repeater with a locally generated
//! transmission ("linked to 4 0 0 5", "not linked"). The vocabulary is a
//! raw AMBE sample bank (`<language>.ambe`, 9-byte frames back to back)
//! plus an index (`<language>.indx`, `word,start,length` lines counted in
//! AMBE frames).
//!
//! A rendered announcement is a voice LC header, voice frames carrying
//! three AMBE frames each, and a terminator, addressed to the session's
//! primary slot and talk-group. Playback starts after a one second
//! hold-off so the terminator that triggered it clears the air first, and
//! is paced at the DMR frame rate of one frame per 60 ms.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use dmr_mux::{GatewayError, Timer, VoiceSource};
use dmr_proto::{DataType, DmrData, Flco, Slot};

const AMBE_FRAME_BYTES: usize = 9;
const AMBE_FRAMES_PER_DMR_FRAME: usize = 3;

/// DMR frame cadence
const FRAME_TIME_MS: u64 = 60;

/// Delay between the triggering terminator and the announcement
const HOLDOFF_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Idle,
    Waiting,
    Sending,
}

/// File-backed announcement source for one XLX session
pub struct Voice {
    directory: PathBuf,
    language: String,
    id: u32,
    slot: Slot,
    tg: u32,

    ambe: Vec<u8>,
    index: HashMap<String, (usize, usize)>,

    status: Status,
    holdoff: Timer,
    elapsed_ms: u64,
    sent: usize,
    frames: Vec<DmrData>,
    stream_id: u32,
}

impl Voice {
    /// `id` is the repeater id used as the announcement's source;
    /// `slot`/`tg` address it to the session's primary pair
    pub fn new(directory: &str, language: &str, id: u32, slot: Slot, tg: u32) -> Self {
        Self {
            directory: PathBuf::from(directory),
            language: language.to_string(),
            id,
            slot,
            tg,
            ambe: Vec::new(),
            index: HashMap::new(),
            status: Status::Idle,
            holdoff: Timer::new(HOLDOFF_MS),
            elapsed_ms: 0,
            sent: 0,
            frames: Vec::new(),
            stream_id: 0,
        }
    }

    /// Collect the AMBE frames for a word sequence
    fn samples_for(&self, words: &[String]) -> Vec<u8> {
        let mut samples = Vec::new();
        for word in words {
            let Some(&(start, count)) = self.index.get(word) else {
                warn!("Voice, no sample for {:?}", word);
                continue;
            };
            let begin = start * AMBE_FRAME_BYTES;
            let end = (start + count) * AMBE_FRAME_BYTES;
            if end > self.ambe.len() {
                warn!("Voice, sample for {:?} runs past the bank", word);
                continue;
            }
            samples.extend_from_slice(&self.ambe[begin..end]);
        }
        samples
    }

    /// Render an announcement and arm the hold-off
    fn build(&mut self, words: &[String]) {
        let samples = self.samples_for(words);
        if samples.is_empty() {
            return;
        }

        self.stream_id = self.stream_id.wrapping_add(1);
        self.frames.clear();

        let slot = self.slot;
        let src_id = self.id;
        let dst_id = self.tg;
        let stream_id = self.stream_id;
        let mut seq_no: u8 = 0;
        let mut make = |data_type: DataType, payload: [u8; 33]| -> DmrData {
            let data = DmrData {
                slot,
                src_id,
                dst_id,
                flco: Flco::Group,
                data_type,
                stream_id,
                seq_no,
                payload,
            };
            seq_no = seq_no.wrapping_add(1);
            data
        };

        self.frames.push(make(DataType::VoiceLcHeader, [0u8; 33]));

        let chunk_bytes = AMBE_FRAMES_PER_DMR_FRAME * AMBE_FRAME_BYTES;
        for (i, chunk) in samples.chunks(chunk_bytes).enumerate() {
            let mut payload = [0u8; 33];
            payload[..chunk.len()].copy_from_slice(chunk);
            let data_type = if i % 6 == 0 {
                DataType::VoiceSync
            } else {
                DataType::Voice
            };
            self.frames.push(make(data_type, payload));
        }

        self.frames.push(make(DataType::TerminatorWithLc, [0u8; 33]));

        self.status = Status::Waiting;
        self.holdoff.start();
        debug!("Voice, rendered {} frames", self.frames.len());
    }

    /// Frames due by now at the 60 ms cadence
    fn due(&self) -> usize {
        (self.elapsed_ms / FRAME_TIME_MS) as usize + 1
    }
}

impl VoiceSource for Voice {
    fn open(&mut self) -> Result<(), GatewayError> {
        let ambe_path = self.directory.join(format!("{}.ambe", self.language));
        let index_path = self.directory.join(format!("{}.indx", self.language));

        self.ambe = fs::read(&ambe_path)
            .map_err(|e| GatewayError::Voice(format!("{}: {}", ambe_path.display(), e)))?;

        let index_text = fs::read_to_string(&index_path)
            .map_err(|e| GatewayError::Voice(format!("{}: {}", index_path.display(), e)))?;

        for line in index_text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 3 {
                return Err(GatewayError::Voice(format!(
                    "{}: malformed line {:?}",
                    index_path.display(),
                    line
                )));
            }
            let start = fields[1]
                .parse()
                .map_err(|_| GatewayError::Voice(format!("bad start in {:?}", line)))?;
            let count = fields[2]
                .parse()
                .map_err(|_| GatewayError::Voice(format!("bad length in {:?}", line)))?;
            self.index.insert(fields[0].to_string(), (start, count));
        }

        debug!(
            "Voice, loaded {} words from {}",
            self.index.len(),
            index_path.display()
        );
        Ok(())
    }

    fn read(&mut self, data: &mut DmrData) -> bool {
        if self.status != Status::Sending || self.sent >= self.due() {
            return false;
        }

        match self.frames.get(self.sent) {
            Some(frame) => {
                *data = frame.clone();
                self.sent += 1;
                if self.sent == self.frames.len() {
                    self.status = Status::Idle;
                }
                true
            }
            None => {
                self.status = Status::Idle;
                false
            }
        }
    }

    fn clock(&mut self, ms: u64) {
        match self.status {
            Status::Idle => {}
            Status::Waiting => {
                self.holdoff.clock(ms);
                if self.holdoff.has_expired() {
                    self.holdoff.stop();
                    self.status = Status::Sending;
                    self.elapsed_ms = 0;
                    self.sent = 0;
                }
            }
            Status::Sending => {
                self.elapsed_ms += ms;
            }
        }
    }

    fn linked_to(&mut self, reflector: u32) {
        let mut words = vec!["linkedto".to_string()];
        words.extend(
            reflector
                .to_string()
                .chars()
                .map(|digit| digit.to_string()),
        );
        self.build(&words);
    }

    fn unlinked(&mut self) {
        self.build(&["notlinked".to_string()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// A bank with five words of two AMBE frames each
    fn vocabulary() -> TempDir {
        let dir = TempDir::new().unwrap();

        let mut ambe = Vec::new();
        for value in 0u8..10 {
            ambe.extend_from_slice(&[value; AMBE_FRAME_BYTES]);
        }
        fs::write(dir.path().join("en_GB.ambe"), &ambe).unwrap();

        let mut index = fs::File::create(dir.path().join("en_GB.indx")).unwrap();
        writeln!(index, "# test vocabulary").unwrap();
        writeln!(index, "linkedto,0,2").unwrap();
        writeln!(index, "notlinked,2,2").unwrap();
        writeln!(index, "4,4,2").unwrap();
        writeln!(index, "0,6,2").unwrap();
        writeln!(index, "5,8,2").unwrap();

        dir
    }

    fn opened_voice(dir: &TempDir) -> Voice {
        let mut voice = Voice::new(
            dir.path().to_str().unwrap(),
            "en_GB",
            1234567,
            Slot::Slot1,
            8,
        );
        voice.open().unwrap();
        voice
    }

    #[test]
    fn open_fails_without_vocabulary() {
        let dir = TempDir::new().unwrap();
        let mut voice = Voice::new(dir.path().to_str().unwrap(), "en_GB", 1, Slot::Slot1, 8);
        assert!(voice.open().is_err());
    }

    #[test]
    fn nothing_plays_before_the_holdoff() {
        let dir = vocabulary();
        let mut voice = opened_voice(&dir);

        voice.linked_to(4005);

        let mut data = DmrData::new();
        assert!(!voice.read(&mut data));

        voice.clock(HOLDOFF_MS - 1);
        assert!(!voice.read(&mut data));
    }

    #[test]
    fn announcement_is_a_framed_transmission() {
        let dir = vocabulary();
        let mut voice = opened_voice(&dir);

        voice.linked_to(4005);
        voice.clock(HOLDOFF_MS);

        let mut frames = Vec::new();
        let mut data = DmrData::new();
        loop {
            while voice.read(&mut data) {
                frames.push(data.clone());
            }
            if frames.last().map(|f| f.is_terminator()).unwrap_or(false) {
                break;
            }
            voice.clock(FRAME_TIME_MS);
        }

        // "linkedto" + "4","0","0","5" = 10 AMBE frames = 4 voice frames,
        // wrapped in a header and a terminator
        assert_eq!(frames.len(), 6);
        assert_eq!(frames[0].data_type, DataType::VoiceLcHeader);
        assert_eq!(frames[1].data_type, DataType::VoiceSync);
        assert_eq!(frames.last().unwrap().data_type, DataType::TerminatorWithLc);

        assert!(frames.iter().all(|f| f.slot == Slot::Slot1));
        assert!(frames.iter().all(|f| f.dst_id == 8));
        assert!(frames.iter().all(|f| f.src_id == 1234567));
        assert!(frames.iter().all(|f| f.flco == Flco::Group));

        // First voice payload carries the "linkedto" samples followed by
        // the first frame of the "4"
        assert_eq!(frames[1].payload[0], 0);
        assert_eq!(frames[1].payload[AMBE_FRAME_BYTES], 1);
        assert_eq!(frames[1].payload[2 * AMBE_FRAME_BYTES], 4);
    }

    #[test]
    fn playback_is_paced() {
        let dir = vocabulary();
        let mut voice = opened_voice(&dir);

        voice.unlinked();
        voice.clock(HOLDOFF_MS);

        let mut data = DmrData::new();
        // One frame due immediately after the hold-off
        assert!(voice.read(&mut data));
        assert!(!voice.read(&mut data));

        voice.clock(FRAME_TIME_MS);
        assert!(voice.read(&mut data));
        assert!(!voice.read(&mut data));
    }

    #[test]
    fn unknown_reflector_words_are_skipped_not_fatal() {
        let dir = vocabulary();
        let mut voice = opened_voice(&dir);

        // 4179 needs "1", "7" and "9" which the bank lacks; the known
        // words still play
        voice.linked_to(4179);
        voice.clock(HOLDOFF_MS);

        let mut data = DmrData::new();
        assert!(voice.read(&mut data));
        assert_eq!(data.data_type, DataType::VoiceLcHeader);
    }
}
