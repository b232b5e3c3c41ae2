use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use super::ProgressFn;

const CHUNK_SIZE: usize = 16 * 1024;

/// Yields an in-memory file in fixed-size chunks, reporting the share sent
/// so far to an optional callback. Percentages are monotonic and end at 100.
pub struct ProgressStream {
    data: Bytes,
    offset: usize,
    chunk_size: usize,
    on_progress: Option<ProgressFn>,
    last_reported: Option<u8>,
}

impl ProgressStream {
    pub fn new(data: Bytes, on_progress: Option<ProgressFn>) -> Self {
        Self::with_chunk_size(data, on_progress, CHUNK_SIZE)
    }

    pub fn with_chunk_size(data: Bytes, on_progress: Option<ProgressFn>, chunk_size: usize) -> Self {
        Self {
            data,
            offset: 0,
            chunk_size: chunk_size.max(1),
            on_progress,
            last_reported: None,
        }
    }

    fn report(&mut self, percent: u8) {
        if self.last_reported.is_some_and(|last| last >= percent) {
            return;
        }
        self.last_reported = Some(percent);
        if let Some(on_progress) = &self.on_progress {
            on_progress(percent);
        }
    }
}

pub fn percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) as u128 * 100) / total as u128) as u8
}

impl Stream for ProgressStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let total = self.data.len();
        if self.offset >= total {
            self.report(100);
            return Poll::Ready(None);
        }

        let end = (self.offset + self.chunk_size).min(total);
        let chunk = self.data.slice(self.offset..end);
        self.offset = end;
        self.report(percent(end, total));

        Poll::Ready(Some(Ok(chunk)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.data.len() - self.offset).div_ceil(self.chunk_size);
        (remaining, Some(remaining))
    }
}
