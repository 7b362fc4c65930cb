#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pointrank::{parse_dataset, ReferenceVector};

#[derive(Arbitrary, Debug)]
struct LoaderInput {
    bytes: Vec<u8>,
    workers: u8,
    reference: String,
}

fuzz_target!(|input: LoaderInput| {
    let workers = usize::from(input.workers % 32) + 1;

    // Must never panic, only return errors
    let single = parse_dataset(&input.bytes, 1);
    let parallel = parse_dataset(&input.bytes, workers);

    match (single, parallel) {
        (Ok(a), Ok(b)) => {
            assert_eq!(a.len(), b.len());
            assert_eq!(a.dim(), b.dim());
            let _ = ReferenceVector::parse(&input.reference, a.dim());
        }
        (Err(a), Err(b)) => {
            assert_eq!(a.error_code(), b.error_code(), "worker count changed the error");
        }
        (a, b) => panic!("worker count changed the outcome: {:?} vs {:?}", a.is_ok(), b.is_ok()),
    }
});
