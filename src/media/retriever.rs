//! Frame Retriever
//!
//! Pulls one decoded picture per call into the handle's reusable slot and
//! hands it to format negotiation.

use log::{debug, warn};

use super::engine::{describe_status, Engine, EngineStatus};
use super::handle::DecoderHandle;
use super::negotiate;
use super::output::OutputBuffer;
use super::DecodeResult;

impl<E: Engine> DecoderHandle<E> {
    /// Retrieve the next decoded picture into `output`.
    ///
    /// Each call overwrites the previous picture; consume `output` before
    /// calling again.
    pub fn get_frame<B: OutputBuffer + ?Sized>(&mut self, output: &mut B) -> DecodeResult {
        let engine = &self.engine;
        let picture = self.picture.get_or_insert_with(|| engine.alloc_picture());

        let status = self.engine.receive(picture);
        self.last_error = status.code();

        match status {
            EngineStatus::Ok => {
                negotiate::deliver(&self.engine, &mut self.converter, picture, output, &mut self.stats)
            }
            EngineStatus::Again => DecodeResult::TryAgain,
            // Short streams can answer the first receive after the final
            // flush with invalid data rather than a clean end marker. Both
            // are treated as exhaustion; this is a heuristic, not a protocol
            // guarantee.
            EngineStatus::Eof | EngineStatus::InvalidData => {
                debug!("End of stream ({})", describe_status(status.code()));
                DecodeResult::EndOfStream
            }
            EngineStatus::Failed(code) => {
                warn!("Failed to receive frame: {}", describe_status(code));
                self.stats.decode_errors += 1;
                DecodeResult::DecodeError
            }
        }
    }
}
