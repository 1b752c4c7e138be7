//! Local filesystem artifact copy

use std::path::Path;

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::errors::BuilderError;
use crate::event::{step, EventReporter, StepTags};
use crate::filesys::file::File;

const CHUNK_SIZE: usize = 64 * 1024;

/// Copy `src` to `dst`, reporting progress in 25% steps.
///
/// Parent directories of `dst` are created. A partially written `dst` is
/// removed when the copy fails.
pub async fn copy_file_with_progress(
    src: &Path,
    dst: &Path,
    reporter: &dyn EventReporter,
) -> Result<(), BuilderError> {
    let dst_file = File::new(dst);
    let result = copy_chunks(src, &dst_file, reporter).await;
    if result.is_err() {
        let _ = dst_file.delete().await;
    }
    result
}

async fn copy_chunks(
    src: &Path,
    dst: &File,
    reporter: &dyn EventReporter,
) -> Result<(), BuilderError> {
    let mut input = fs::File::open(src).await?;
    let total = input.metadata().await?.len();
    debug!("Copying {} ({} bytes) to {}", src.display(), total, dst.path().display());

    dst.ensure_parent().await?;
    let mut output = fs::File::create(dst.path()).await?;

    reporter.info(
        &format!("Start copying {} ({} bytes)", src.display(), total),
        StepTags::step(step::SLUG_SHARE),
    );

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;
    let mut next_mark: u64 = 25;
    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n]).await?;
        copied += n as u64;

        if total > 0 {
            let percent = copied * 100 / total;
            while next_mark <= 100 && percent >= next_mark {
                reporter.info(
                    &format!("Copied {}%", next_mark),
                    StepTags::step(step::SLUG_SHARE),
                );
                next_mark += 25;
            }
        }
    }
    output.sync_all().await?;

    reporter.info(
        &format!("Copy finished, {} bytes", copied),
        StepTags::step(step::SLUG_SHARE),
    );
    Ok(())
}
