#![no_main]
use fwpatch::codec::{BsdiffHeatshrink, DeltaCodec};
use fwpatch::{CompressionConfig, verify};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Applying arbitrary bytes must never panic, only return errors.
    if data.len() < 2 || data.len() > 1 << 16 {
        return;
    }
    let config = CompressionConfig::new(data[0] % 16, data[1] % 16);
    let (source, payload) = data[2..].split_at((data.len() - 2) / 3);
    let _ = BsdiffHeatshrink.apply(source, payload, config);

    // The same bytes treated as a full patch file.
    let _ = verify::reconstruct(&BsdiffHeatshrink, source, payload, None);
});
