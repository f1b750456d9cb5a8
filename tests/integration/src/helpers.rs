//! Test helpers

use flate2::{Compress, FlushCompress};
use std::future::Future;
use std::time::Duration;

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `future`, failing the test if it takes longer than [`TEST_TIMEOUT`]
pub async fn within<F: Future>(what: &str, future: F) -> F::Output {
    match tokio::time::timeout(TEST_TIMEOUT, future).await {
        Ok(output) => output,
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

/// Poll `condition` until it holds
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    within(what, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

/// Compress `payload` as one zlib-stream unit ending in `00 00 FF FF`
pub fn compress_unit(compress: &mut Compress, payload: &[u8]) -> Vec<u8> {
    let start = compress.total_in();
    let mut out = Vec::with_capacity(payload.len() + 64);

    loop {
        let consumed = (compress.total_in() - start) as usize;
        compress
            .compress_vec(&payload[consumed..], &mut out, FlushCompress::Sync)
            .expect("compression failed");

        let consumed = (compress.total_in() - start) as usize;
        if consumed == payload.len() && out.len() < out.capacity() {
            return out;
        }
        out.reserve(out.capacity().max(64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;

    #[test]
    fn test_compressed_unit_ends_with_sync_marker() {
        let mut compress = Compress::new(Compression::default(), true);
        let first = compress_unit(&mut compress, br#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
        let second = compress_unit(&mut compress, &vec![b'x'; 100_000]);

        assert!(first.ends_with(&[0x00, 0x00, 0xFF, 0xFF]));
        assert!(second.ends_with(&[0x00, 0x00, 0xFF, 0xFF]));
    }
}
