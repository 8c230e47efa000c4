//! Additive 16-bit frame checksum.
//!
//! Sender and receiver run the same routine: the sender attaches the value,
//! the receiver recomputes it over the payload and compares. This is a weak
//! integrity check (reordered bytes or compensating changes are not caught).

use std::io::{Cursor, Read};

/// Wrapping sum of every byte, modulo 2^16.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
}

/// Checksum the unread part of a cursor without consuming it.
///
/// The position is put back by a guard, so the buffer can be read again by
/// the payload decoder afterwards.
pub fn checksum_unread<T: AsRef<[u8]>>(cursor: &mut Cursor<T>) -> u16 {
    let mut guard = RestorePosition::mark(cursor);
    (&mut *guard.cursor)
        .bytes()
        .map_while(Result::ok)
        .fold(0u16, |sum, b| sum.wrapping_add(u16::from(b)))
}

struct RestorePosition<'a, T> {
    cursor: &'a mut Cursor<T>,
    mark: u64,
}

impl<'a, T> RestorePosition<'a, T> {
    fn mark(cursor: &'a mut Cursor<T>) -> Self {
        let mark = cursor.position();
        Self { cursor, mark }
    }
}

impl<T> Drop for RestorePosition<'_, T> {
    fn drop(&mut self) {
        self.cursor.set_position(self.mark);
    }
}
