//! Property tests for the render ring buffer.

use std::collections::VecDeque;

use proptest::prelude::*;
use stream_render::{OverflowPolicy, RenderBuffer, RenderError};

const FRAME_SIZE: usize = 4;
const MAX_FRAMES: usize = 64;

#[derive(Debug, Clone)]
enum Op {
    Write(Vec<u8>),
    Read(usize),
    Reset,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => prop::collection::vec(any::<u8>(), 0..=MAX_FRAMES * FRAME_SIZE).prop_map(Op::Write),
        3 => (0usize..=MAX_FRAMES * FRAME_SIZE).prop_map(Op::Read),
        1 => Just(Op::Reset),
    ]
}

fn capacity_strategy() -> impl Strategy<Value = usize> {
    (1usize..=MAX_FRAMES).prop_map(|frames| frames * FRAME_SIZE)
}

proptest! {
    #[test]
    fn fifo_matches_queue_model(
        capacity in capacity_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..64),
    ) {
        let mut buffer = RenderBuffer::new(capacity, FRAME_SIZE, OverflowPolicy::Reject);
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Write(data) => {
                    let free = capacity - model.len();
                    match buffer.write(&data) {
                        Ok(outcome) => {
                            prop_assert!(data.len() <= free);
                            prop_assert_eq!(outcome.written, data.len());
                            prop_assert_eq!(outcome.dropped, 0);
                            model.extend(data);
                        }
                        Err(RenderError::BufferOverflow { requested, available }) => {
                            prop_assert!(data.len() > free);
                            prop_assert_eq!(requested, data.len());
                            prop_assert_eq!(available, free);
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {e}"),
                    }
                }
                Op::Read(len) => {
                    let len = len.min(model.len());
                    let mut out = vec![0u8; len];
                    prop_assert_eq!(buffer.read(&mut out), len);
                    let expected: Vec<u8> = model.drain(..len).collect();
                    prop_assert_eq!(out, expected);
                }
                Op::Reset => {
                    buffer.reset();
                    model.clear();
                    prop_assert_eq!(buffer.available_read(), 0);
                }
            }

            prop_assert_eq!(buffer.available_read(), model.len());
            prop_assert!(buffer.available_read() <= buffer.capacity());
        }
    }

    #[test]
    fn concatenated_writes_read_back_in_order(
        writes in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16),
    ) {
        let total: usize = writes.iter().map(Vec::len).sum();
        let mut buffer = RenderBuffer::new(total.max(1), 1, OverflowPolicy::Reject);

        for write in &writes {
            buffer.write(write).unwrap();
        }

        let mut out = vec![0u8; total];
        buffer.read(&mut out);
        prop_assert_eq!(out, writes.concat());
    }

    #[test]
    fn drop_oldest_keeps_newest_whole_frames(
        frames in 1usize..=MAX_FRAMES,
        first in prop::collection::vec(any::<u8>(), 0..=MAX_FRAMES * FRAME_SIZE),
        second in prop::collection::vec(any::<u8>(), 0..=MAX_FRAMES * FRAME_SIZE),
    ) {
        let capacity = frames * FRAME_SIZE;
        let mut buffer = RenderBuffer::new(capacity, FRAME_SIZE, OverflowPolicy::DropOldest);

        // Frame-aligned writes keep the stream aligned.
        let first = &first[..first.len() - first.len() % FRAME_SIZE];
        let second = &second[..second.len() - second.len() % FRAME_SIZE];
        buffer.write(first).unwrap();
        buffer.write(second).unwrap();

        let mut expected: Vec<u8> = first.iter().chain(second).copied().collect();
        let keep = expected.len().min(capacity);
        expected.drain(..expected.len() - keep);

        prop_assert_eq!(buffer.available_read(), keep);
        prop_assert_eq!(buffer.available_read() % FRAME_SIZE, 0);
        let mut out = vec![0u8; keep];
        buffer.read(&mut out);
        prop_assert_eq!(out, expected);
    }
}
