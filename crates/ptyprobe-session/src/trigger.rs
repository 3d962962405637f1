//! One-shot prompt trigger.

use memchr::memmem::Finder;

use ptyprobe_core::TriggerSettings;

use crate::output::TranscriptBuffer;

/// Watches the transcript for a recognition pattern and holds the command to
/// send when one appears.
///
/// The trigger fires at most once per session. Matching is plain,
/// case-sensitive substring containment over raw bytes, anywhere in the
/// accumulated output.
#[derive(Debug)]
pub struct PromptTrigger {
    finders: Vec<Finder<'static>>,
    command: Vec<u8>,
    fired: bool,
    /// Buffer length at the previous check
    scanned: usize,
    /// Length of the longest pattern
    longest: usize,
}

impl PromptTrigger {
    /// Build a trigger from raw patterns and the exact bytes to inject.
    ///
    /// Empty patterns are ignored.
    pub fn new<P: AsRef<[u8]>>(patterns: &[P], command: impl Into<Vec<u8>>) -> Self {
        let finders: Vec<Finder<'static>> = patterns
            .iter()
            .map(|p| AsRef::<[u8]>::as_ref(p))
            .filter(|p| !p.is_empty())
            .map(|p| Finder::new(p).into_owned())
            .collect();
        let longest = finders.iter().map(|f| f.needle().len()).max().unwrap_or(0);

        Self {
            finders,
            command: command.into(),
            fired: false,
            scanned: 0,
            longest,
        }
    }

    /// Build a trigger from configuration. The command gets its `\r` here.
    pub fn from_settings(settings: &TriggerSettings) -> Self {
        Self::new(&settings.pattern_bytes(), settings.command_bytes())
    }

    /// Look for a pattern in `buffer`.
    ///
    /// Returns the index of the matched pattern, or `None` if nothing matched
    /// or the trigger already fired. The result is the same as checking the
    /// whole buffer; only the region that could hold a new match is scanned.
    pub fn check(&mut self, buffer: &TranscriptBuffer) -> Option<usize> {
        if self.fired || self.finders.is_empty() {
            return None;
        }

        // A match not seen last time must end past `scanned`.
        let from = self.scanned.saturating_sub(self.longest.saturating_sub(1));
        self.scanned = buffer.len();

        buffer.find_any(&self.finders, from).map(|(index, _)| index)
    }

    /// Record that the command has been sent. Further checks return `None`.
    pub fn mark_fired(&mut self) {
        self.fired = true;
    }

    /// Whether the trigger has fired.
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Bytes written to the PTY when the trigger fires.
    pub fn command(&self) -> &[u8] {
        &self.command
    }

    /// The pattern at `index`.
    pub fn pattern(&self, index: usize) -> Option<&[u8]> {
        self.finders.get(index).map(|f| f.needle())
    }
}
