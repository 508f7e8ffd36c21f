use rand::Rng;
use std::sync::Mutex;

const PUSH_CHARS: &[u8] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Chronologically ordered 20-character keys: 8 characters of
/// millisecond timestamp followed by 12 random characters. Keys minted in
/// the same millisecond increment the random tail so they still sort
/// strictly after the previous one.
#[derive(Debug, Default)]
pub struct PushKeyGenerator {
    last: Mutex<(i64, [u8; 12])>,
}

impl PushKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_key(&self) -> String {
        self.next_key_at(chrono::Utc::now().timestamp_millis())
    }

    fn next_key_at(&self, now_ms: i64) -> String {
        let mut last = match self.last.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut rng = rand::thread_rng();
        if now_ms == last.0 {
            for digit in last.1.iter_mut().rev() {
                if *digit == 63 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    break;
                }
            }
        } else {
            for digit in last.1.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
        }
        last.0 = now_ms;
        let tail_copy = last.1;

        let mut out = [0u8; 20];
        let mut ts = now_ms;
        for i in (0..8).rev() {
            out[i] = PUSH_CHARS[(ts % 64) as usize];
            ts /= 64;
        }
        for (i, d) in tail_copy.iter().enumerate() {
            out[8 + i] = PUSH_CHARS[*d as usize];
        }
        out.iter().map(|b| *b as char).collect()
    }
}
