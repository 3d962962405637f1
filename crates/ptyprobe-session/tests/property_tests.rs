//! Property tests for transcript accumulation and the prompt trigger.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use ptyprobe_core::{Result, TimingSettings};
use ptyprobe_session::{Drained, PromptTrigger, SessionDriver, Terminal, TranscriptBuffer};

/// Plays back chunks, one per drain, and counts writes.
struct Playback {
    chunks: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
}

impl Terminal for Playback {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn drain_available(&mut self, _deadline: Instant) -> Drained {
        match self.chunks.pop_front() {
            Some(chunk) => Drained::Output(chunk),
            None => Drained::Idle,
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.writes.push(data.to_vec());
        Ok(data.len())
    }

    fn kill(&mut self) {}
}

fn naive_contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Alphabet small enough that patterns show up by chance.
fn chunk_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'/', b'\r', 0xff]), 0..6)
}

fn no_wait_timing() -> TimingSettings {
    TimingSettings {
        settle_delay_ms: 0,
        loop_sleep_ms: 0,
        ..TimingSettings::default()
    }
}

proptest! {
    #[test]
    fn prop_buffer_is_concatenation(chunks in prop::collection::vec(chunk_strategy(), 0..20)) {
        let mut buffer = TranscriptBuffer::new();
        for chunk in &chunks {
            buffer.append(chunk);
        }
        let expected = chunks.concat();
        prop_assert_eq!(buffer.as_bytes(), expected.as_slice());
        prop_assert_eq!(buffer.chunk_count(), chunks.iter().filter(|c| !c.is_empty()).count());
    }

    #[test]
    fn prop_trigger_matches_whole_buffer_scan(
        chunks in prop::collection::vec(chunk_strategy(), 0..20),
        pattern in prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'/']), 1..4),
    ) {
        let mut trigger = PromptTrigger::new(&[pattern.clone()], b"/stats\r".to_vec());
        let mut buffer = TranscriptBuffer::new();

        for chunk in &chunks {
            buffer.append(chunk);
            let expected = naive_contains(buffer.as_bytes(), &pattern);
            let fired = trigger.check(&buffer).is_some();
            prop_assert_eq!(fired, expected);
            if fired {
                trigger.mark_fired();
                break;
            }
        }
    }

    #[test]
    fn prop_driver_injects_at_most_once(
        chunks in prop::collection::vec(chunk_strategy(), 0..20),
        pattern in prop::collection::vec(prop::sample::select(vec![b'a', b'b']), 1..3),
    ) {
        let terminal = Playback { chunks: chunks.clone().into(), writes: Vec::new() };
        let trigger = PromptTrigger::new(&[pattern.clone()], b"/stats\r".to_vec());
        let mut driver = SessionDriver::with_trigger(terminal, no_wait_timing(), trigger);

        let deadline = Instant::now() + Duration::from_secs(60);
        for _ in 0..chunks.len() + 1 {
            driver.poll_once(deadline);
        }

        let all = chunks.concat();
        let writes = &driver.terminal().writes;
        prop_assert!(writes.len() <= 1);
        prop_assert_eq!(writes.len() == 1, naive_contains(&all, &pattern));
        prop_assert_eq!(driver.transcript().as_bytes(), all.as_slice());
    }
}
