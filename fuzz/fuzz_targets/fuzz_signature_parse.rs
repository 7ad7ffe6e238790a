#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Malformed signatures must be rejected, never panic.
        let _ = nftgate::auth::recover_personal_signer(nftgate::config::DEFAULT_CHALLENGE, s);
    }
});
