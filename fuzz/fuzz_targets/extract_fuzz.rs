#![no_main]
use fwpatch::codec::BsdiffPrefix;
use fwpatch::header::{self, PatchArtifact};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Header parsing must never panic, only return errors.
    let Ok(parts) = header::extract(data) else {
        assert!(PatchArtifact::from_bytes(data.to_vec()).is_err());
        return;
    };
    let _ = BsdiffPrefix::parse(parts.prefix);

    let artifact = PatchArtifact::from_bytes(data.to_vec()).unwrap();
    assert_eq!(artifact.config(), parts.config);
    assert_eq!(artifact.diff_stream(), parts.diff_stream);
    assert_eq!(artifact.codec_payload().len() + 2, data.len());
});
