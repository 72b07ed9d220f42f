use std::io::{self, Write};

/// Writer that duplicates every write to each target, in order.
///
/// Each target receives the whole buffer before the next one is touched.
/// The first failing target aborts the write and its error is returned;
/// targets after it do not see that buffer.
pub struct FanOut<'a> {
    targets: Vec<&'a mut dyn Write>,
    written: u64,
}

impl<'a> FanOut<'a> {
    pub fn new(targets: Vec<&'a mut dyn Write>) -> Self {
        Self {
            targets,
            written: 0,
        }
    }

    /// Bytes accepted by every target.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Write for FanOut<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for target in self.targets.iter_mut() {
            target.write_all(buf)?;
        }
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for target in self.targets.iter_mut() {
            target.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `budget` bytes, then fails.
    struct Limited {
        budget: usize,
        seen: Vec<u8>,
    }

    impl Write for Limited {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.seen.len() + buf.len() > self.budget {
                return Err(io::Error::other("full"));
            }
            self.seen.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn every_target_sees_every_byte() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut fan = FanOut::new(vec![&mut a as &mut dyn Write, &mut b as &mut dyn Write]);
        fan.write_all(b"hello ").unwrap();
        fan.write_all(b"world").unwrap();
        assert_eq!(fan.written(), 11);
        drop(fan);
        assert_eq!(a, b"hello world");
        assert_eq!(b, b"hello world");
    }

    #[test]
    fn first_failure_stops_later_targets() {
        let mut first = Vec::new();
        let mut failing = Limited {
            budget: 4,
            seen: Vec::new(),
        };
        let mut last = Vec::new();
        let mut fan = FanOut::new(vec![
            &mut first as &mut dyn Write,
            &mut failing as &mut dyn Write,
            &mut last as &mut dyn Write,
        ]);
        fan.write_all(b"abcd").unwrap();
        assert!(fan.write_all(b"ef").is_err());
        assert_eq!(fan.written(), 4);
        drop(fan);
        assert_eq!(first, b"abcdef");
        assert_eq!(failing.seen, b"abcd");
        assert_eq!(last, b"abcd");
    }
}
