//! Timer line parsing.
//!
//! The device prints finish times in lane order with a fixed resolution of
//! four decimal places, e.g. `A=1.2345! B=2.3456 C=3.4567 D=4.5678`. Lane
//! labels are ignored: the n-th time token belongs to lane n.
use crate::race::{LANES, RaceResult};

/// Fractional digits of every time the device emits.
pub const TIME_DECIMALS: usize = 4;

/// Extract up to four lane times from one line. Never fails: anything that
/// is not a well-formed time token is skipped. A zero reading is kept in its
/// position but counts as no finish.
pub fn parse_timer_line(line: &str) -> RaceResult {
    let mut times = [None; LANES];
    for (slot, t) in times.iter_mut().zip(time_tokens(line)) {
        *slot = (t > 0.0).then_some(t);
    }
    RaceResult::new(times)
}

/// Iterate the well-formed time tokens of `line` left to right.
///
/// A time is a maximal digit run, a dot, and a maximal run of exactly four
/// digits. Punctuation around it, dots included, does not matter, so
/// `1.2345.` and `x.1.2345` both read 1.2345 while `1.23456` reads nothing.
pub fn time_tokens(line: &str) -> impl Iterator<Item = f64> + '_ {
    let bytes = line.as_bytes();
    let mut pos = 0;
    std::iter::from_fn(move || {
        while pos < bytes.len() {
            let start = pos;
            let int_end = digit_run_end(bytes, start);
            if int_end == start {
                pos += 1;
                continue;
            }
            pos = int_end;
            if bytes.get(int_end) != Some(&b'.') {
                continue;
            }
            let frac_end = digit_run_end(bytes, int_end + 1);
            if frac_end - (int_end + 1) != TIME_DECIMALS {
                continue;
            }
            pos = frac_end;
            if let Ok(t) = line[start..frac_end].parse() {
                return Some(t);
            }
        }
        None
    })
}

fn digit_run_end(bytes: &[u8], from: usize) -> usize {
    from + bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lanes(line: &str) -> [Option<f64>; LANES] {
        *parse_timer_line(line).times()
    }

    #[test]
    fn assigns_by_position() {
        assert_eq!(
            lanes("A=3.1234! B=2.0000 C=4.5678 D=1.9999"),
            [Some(3.1234), Some(2.0), Some(4.5678), Some(1.9999)]
        );
    }

    #[test]
    fn fewer_than_four_leaves_rest_absent() {
        assert_eq!(lanes("1.2345 1.1111 "), [Some(1.2345), Some(1.1111), None, None]);
    }

    #[test]
    fn caps_at_four() {
        assert_eq!(
            lanes("1.0001 1.0002 1.0003 1.0004 1.0005"),
            [Some(1.0001), Some(1.0002), Some(1.0003), Some(1.0004)]
        );
    }

    #[test]
    fn rejects_wrong_precision() {
        assert_eq!(lanes("1.234 1.23456 12345 .1234 1. 1..2345"), [None; LANES]);
        assert_eq!(lanes("1.234 9.8765 1.23456"), [Some(9.8765), None, None, None]);
    }

    #[test]
    fn dots_around_a_time_do_not_hide_it() {
        assert_eq!(lanes("A=1.2345. B=2.3456."), [Some(1.2345), Some(2.3456), None, None]);
        assert_eq!(lanes("Lane.1.2345"), [Some(1.2345), None, None, None]);
        assert_eq!(lanes("1.2345.6789"), [Some(1.2345), None, None, None]);
        assert_eq!(lanes("3.1.2345 1.23456."), [Some(1.2345), None, None, None]);
    }

    #[test]
    fn zero_reading_is_no_finish_but_keeps_its_lane() {
        assert_eq!(lanes("0.0000 1.5000 0.0000"), [None, Some(1.5), None, None]);
        assert!(parse_timer_line("0.0000 0.0000").is_empty());
    }

    #[test]
    fn telemetry_and_garbage_yield_nothing() {
        for line in ["READY", "", "lane reset", "...", "1.2.3.4", "\u{fffd}\u{0}"] {
            assert!(parse_timer_line(line).is_empty(), "{line:?}");
        }
    }

    #[test]
    fn tokens_in_order() {
        let got: Vec<f64> = time_tokens("x0.5000y10.0000,z7.7777").collect();
        assert_eq!(got, vec![0.5, 10.0, 7.7777]);
    }
}
