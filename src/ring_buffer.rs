#![warn(clippy::pedantic)]

/// Fixed-size circular log with a power-of-two length. New pushes overwrite
/// the oldest entry, and the buffer starts zeroed rather than empty, so
/// reading it out always yields a full window of values. Because the length
/// is `2^n`, wrapping an index is a single bitmask (`x & (2^n - 1)`), which
/// keeps pushes cheap enough to do on every optimizer tick.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct DyadicRingBuffer<T: Copy + Default> {
    exponent: usize,
    mask: usize,
    head: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> DyadicRingBuffer<T> {
    /// Allocate a buffer of length `2^exponent`. Returns `None` for exponents
    /// above 20; a telemetry log longer than ~1M entries is a config mistake.
    #[must_use]
    pub fn new(exponent: usize) -> Option<Self> {
        if exponent > 20 {
            return None;
        }
        let len = 1usize << exponent;
        Some(DyadicRingBuffer {
            exponent,
            mask: len - 1,
            head: len - 1,
            data: vec![T::default(); len],
        })
    }

    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn exponent(&self) -> usize {
        self.exponent
    }

    #[inline]
    pub fn push(&mut self, val: T) {
        self.head = self.head.wrapping_add(1);
        self.data[self.head & self.mask] = val;
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, vals: I) {
        for v in vals {
            self.push(v);
        }
    }

    /// Most recently pushed value.
    #[must_use]
    pub fn last(&self) -> T {
        self.data[self.head & self.mask]
    }

    /// Iterate oldest-to-newest over the whole window.
    #[must_use]
    pub fn iter(&self) -> Iter<T> {
        self.last_n(self.len())
    }

    /// Iterate oldest-to-newest over the final `num` entries.
    #[must_use]
    pub fn last_n(&self, num: usize) -> Iter<T> {
        Iter {
            parent: self,
            remaining: num.min(self.len()),
        }
    }
}

pub struct Iter<'a, T: Default + Copy> {
    parent: &'a DyadicRingBuffer<T>,
    remaining: usize,
}

impl<T: Default + Copy> Iterator for Iter<'_, T> {
    type Item = T;
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let idx = self.parent.head.wrapping_sub(self.remaining - 1);
        self.remaining -= 1;
        Some(self.parent.data[idx & self.parent.mask])
    }
}

impl<T: Default + Copy> ExactSizeIterator for Iter<'_, T> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<'a, T: Default + Copy> IntoIterator for &'a DyadicRingBuffer<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;
    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        let buff = DyadicRingBuffer::<usize>::new(8).expect("should allocate");
        assert_eq!(buff.exponent(), 8);
        assert_eq!(buff.len(), 256);

        let buff = DyadicRingBuffer::<usize>::new(0).expect("should allocate");
        assert_eq!(buff.len(), 1);

        assert!(DyadicRingBuffer::<usize>::new(24).is_none());
    }

    #[test]
    fn starts_zeroed() {
        let buff = DyadicRingBuffer::<i32>::new(4).expect("should allocate");
        assert!(buff.iter().all(|x| x == 0));
        assert_eq!(buff.iter().len(), 16);
    }

    #[test]
    fn overwrites_oldest() {
        let mut buff = DyadicRingBuffer::new(3).expect("should allocate");
        for i in 0..10 {
            buff.push(i);
        }
        let got: Vec<i32> = buff.iter().collect();
        let want: Vec<i32> = (2..10).collect();
        assert_eq!(got, want);
        assert_eq!(buff.last(), 9);
    }

    #[test]
    fn last_n() {
        let mut buff = DyadicRingBuffer::new(10).expect("should allocate");
        buff.extend(0..1024_usize);
        let got: Vec<usize> = buff.last_n(4).collect();
        assert_eq!(got, vec![1020, 1021, 1022, 1023]);
        assert_eq!(buff.last_n(4).len(), 4);
        // asking for more than the window caps at the window
        assert_eq!(buff.last_n(4096).len(), 1024);
    }
}
