//! Randomized crash test: a long walk of `alloc`/`free`/`realloc` over a
//! fixed set of logical handles, verifying a per-handle byte checksum
//! after every step and full arena reclamation at the end.

use core::ptr::NonNull;

use proptest::prelude::*;
use zonal::ZoneAlloc;

const HANDLES: usize = 30;
const MAX_REQUEST: usize = 16000;

#[derive(Debug, Clone)]
struct Step {
    id: usize,
    size: usize,
    value: u8,
    coin: bool,
}

struct Handle {
    addr: NonNull<u8>,
    size: usize,
    value: u8,
    checksum: u64,
}

fn checksum(addr: NonNull<u8>, size: usize) -> u64 {
    let bytes = unsafe { core::slice::from_raw_parts(addr.as_ptr(), size) };
    bytes.iter().map(|&b| u64::from(b)).sum()
}

fn fill(addr: NonNull<u8>, size: usize, value: u8) {
    unsafe { addr.as_ptr().write_bytes(value, size) };
}

fn dump_string(zone: &ZoneAlloc) -> String {
    let mut out = String::new();
    zone.dump(&mut out).unwrap();
    out
}

/// Runs the walk: an empty handle allocates, a live one frees or
/// reallocs on a coin flip.
fn run(zone: &mut ZoneAlloc, steps: &[Step]) {
    let mut handles: Vec<Option<Handle>> = (0..HANDLES).map(|_| None).collect();

    for step in steps {
        let slot = &mut handles[step.id];
        if slot.is_none() {
            if let Some(addr) = zone.alloc(step.size) {
                fill(addr, step.size, step.value);
                *slot = Some(Handle {
                    addr,
                    size: step.size,
                    value: step.value,
                    checksum: checksum(addr, step.size),
                });
            }
        } else if step.coin {
            let handle = slot.take().unwrap();
            unsafe { zone.free(handle.addr) };
        } else {
            let handle = slot.as_mut().unwrap();
            match unsafe { zone.realloc(handle.addr, step.size) } {
                Some(addr) => {
                    // the written prefix must survive the move
                    let preserved = handle.size.min(step.size);
                    let bytes = unsafe { core::slice::from_raw_parts(addr.as_ptr(), preserved) };
                    assert!(
                        bytes.iter().all(|&b| b == handle.value),
                        "realloc lost data at step id {}",
                        step.id
                    );
                    fill(addr, step.size, step.value);
                    *handle = Handle {
                        addr,
                        size: step.size,
                        value: step.value,
                        checksum: checksum(addr, step.size),
                    };
                }
                // on failure the old allocation stays live and intact
                None => {}
            }
        }

        // no operation may corrupt any other live handle
        for handle in handles.iter().flatten() {
            assert_eq!(
                checksum(handle.addr, handle.size),
                handle.checksum,
                "checksum mismatch"
            );
        }
    }

    for slot in &mut handles {
        if let Some(handle) = slot.take() {
            unsafe { zone.free(handle.addr) };
        }
    }
}

fn step_strategy() -> impl Strategy<Value = Step> {
    (0..HANDLES, 0..MAX_REQUEST, any::<u8>(), any::<bool>()).prop_map(|(id, size, value, coin)| {
        Step {
            id,
            size,
            value,
            coin,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn crash_test_random_walk(steps in proptest::collection::vec(step_strategy(), 1..400)) {
        let mut zone = ZoneAlloc::new().expect("arena");
        let fresh = dump_string(&zone);

        run(&mut zone, &steps);

        // draining every handle folds the arena back to its initial state
        prop_assert_eq!(dump_string(&zone), fresh);
    }
}

#[test]
fn crash_test_ten_thousand_steps() {
    // xorshift64 keeps the long run deterministic
    let mut state = 0x2545_f491_4f6c_dd1d_u64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    let steps: Vec<Step> = (0..10_000)
        .map(|_| {
            let r = next();
            Step {
                id: (r % HANDLES as u64) as usize,
                size: ((r >> 8) % MAX_REQUEST as u64) as usize,
                value: (r >> 24) as u8,
                coin: r & (1 << 40) != 0,
            }
        })
        .collect();

    let mut zone = ZoneAlloc::new().expect("arena");
    let fresh = dump_string(&zone);

    run(&mut zone, &steps);

    assert_eq!(dump_string(&zone), fresh);
}
