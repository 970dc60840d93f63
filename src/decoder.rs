//! Top-level decode: header, then blocks, then samples in file order

use crate::config::DecodeOptions;
use crate::core::sample::{DecodeSummary, Sample};
use crate::error::{Error, Result};
use crate::format::block::{BlockIterator, DataBlock};
use crate::format::header::RecordingHeader;
use crate::format::unpack::unpack_block;
use crate::output::SampleSink;
use futures::{stream, StreamExt, TryStreamExt};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Decoder owning one recording's byte source.
///
/// The header is parsed on construction. Blocks and samples are produced
/// lazily by consuming the decoder.
pub struct Decoder<R> {
    header: RecordingHeader,
    reader: R,
    options: DecodeOptions,
}

impl Decoder<BufReader<File>> {
    /// Open a recording file and parse its header
    pub fn open<P: AsRef<Path>>(path: P, options: &DecodeOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        tracing::debug!(path = %path.display(), "opened recording");
        Self::new(BufReader::new(file), options)
    }
}

impl<R: BufRead> Decoder<R> {
    /// Parse the header from a reader positioned at the start of a recording
    pub fn new(mut reader: R, options: &DecodeOptions) -> Result<Self> {
        let header = RecordingHeader::parse(&mut reader)?;
        Ok(Self {
            header,
            reader,
            options: options.clone(),
        })
    }

    /// Get the recording header
    pub fn header(&self) -> &RecordingHeader {
        &self.header
    }

    /// Split into the header and an iterator over the data blocks
    pub fn into_parts(self) -> (RecordingHeader, BlockIterator<R>) {
        let blocks = BlockIterator::new(self.reader, &self.header, self.options.verify_sequence);
        (self.header, blocks)
    }

    /// Iterate over the data blocks
    pub fn blocks(self) -> BlockIterator<R> {
        self.into_parts().1
    }

    /// Lazily iterate over every sample, in file order
    pub fn samples(self) -> Samples<R> {
        let (header, blocks) = self.into_parts();
        Samples {
            header,
            blocks,
            current: Vec::new().into_iter(),
        }
    }

    /// Decode every sample into memory
    pub fn decode_all(self) -> Result<Vec<Sample>> {
        self.samples().collect()
    }

    /// Decode every sample into `sink`, finishing the sink on success
    pub fn decode_into<S: SampleSink + ?Sized>(self, sink: &mut S) -> Result<DecodeSummary> {
        let (header, blocks) = self.into_parts();
        let mut summary = DecodeSummary::default();

        for block in blocks {
            let block = block?;
            for sample in unpack_block(&block, &header) {
                sink.write_sample(&sample)?;
                summary.record(&sample);
            }
            summary.blocks += 1;
        }

        sink.finish()?;
        log_summary(&header, &summary);
        Ok(summary)
    }
}

/// Decode with block reading and unpacking moved to the blocking pool.
///
/// One blocking task reads blocks in file order and hands them over a
/// bounded channel; up to `workers` of them are unpacked at once. Samples
/// reach `sink` in block order no matter which unpack finishes first.
pub async fn decode_parallel<R, S>(
    decoder: Decoder<R>,
    workers: usize,
    sink: &mut S,
) -> Result<DecodeSummary>
where
    R: BufRead + Send + 'static,
    S: SampleSink + ?Sized,
{
    let workers = workers.max(1);
    let (header, blocks) = decoder.into_parts();
    let header = Arc::new(header);
    let mut summary = DecodeSummary::default();

    let (block_tx, block_rx) = mpsc::channel::<Result<DataBlock>>(workers);
    let reader = tokio::task::spawn_blocking(move || {
        for block in blocks {
            // A closed channel means the consumer stopped early
            if block_tx.blocking_send(block).is_err() {
                break;
            }
        }
    });

    let received = stream::unfold(block_rx, |mut rx| async move {
        rx.recv().await.map(|block| (block, rx))
    });
    let unpacked = received
        .map(|block| {
            let header = Arc::clone(&header);
            async move {
                let block = block?;
                let index = block.index;
                let samples =
                    tokio::task::spawn_blocking(move || unpack_block(&block, &header)).await?;
                Ok::<_, Error>((index, samples))
            }
        })
        .buffered(workers);
    futures::pin_mut!(unpacked);

    while let Some((index, samples)) = unpacked.try_next().await? {
        debug_assert_eq!(index, summary.blocks);
        for sample in &samples {
            sink.write_sample(sample)?;
            summary.record(sample);
        }
        summary.blocks += 1;
    }
    reader.await?;

    sink.finish()?;
    log_summary(&header, &summary);
    Ok(summary)
}

fn log_summary(header: &RecordingHeader, summary: &DecodeSummary) {
    tracing::info!(
        serial = %header.serial,
        blocks = summary.blocks,
        samples = summary.samples,
        first = ?summary.first.map(|t| t.to_string()),
        last = ?summary.last.map(|t| t.to_string()),
        "decoded recording"
    );
}

/// Lazy sample iterator returned by [`Decoder::samples`]
pub struct Samples<R> {
    header: RecordingHeader,
    blocks: BlockIterator<R>,
    current: std::vec::IntoIter<Sample>,
}

impl<R> Samples<R> {
    /// Get the recording header
    pub fn header(&self) -> &RecordingHeader {
        &self.header
    }
}

impl<R: BufRead> Iterator for Samples<R> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(sample) = self.current.next() {
                return Some(Ok(sample));
            }
            match self.blocks.next()? {
                Ok(block) => self.current = unpack_block(&block, &self.header).into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
