/// Namespace stack holding (prefix, uri) string index pairs per element depth.
///
/// Everything lives in one flat `i32` buffer made of depth frames:
/// `count, (prefix, uri)*, count`. The count is stored on both ends so the
/// frames can be walked in either direction. `increase_depth` opens a frame,
/// `decrease_depth` drops the current one along with any pairs that were not
/// popped. `push`/`pop` only touch the current frame. Lookups scan from the
/// most recent pair of the current frame outwards. Every function uses `-1`
/// as the invalid value.
#[derive(Debug, Clone)]
pub struct NamespaceStack {
    data: Vec<i32>,
    data_length: usize,
    depth: usize,
}

impl Default for NamespaceStack {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceStack {
    pub fn new() -> Self {
        NamespaceStack {
            data: vec![0; 32],
            data_length: 0,
            depth: 0,
        }
    }

    pub fn reset(&mut self) {
        self.data_length = 0;
        self.depth = 0;
    }

    /// Number of pairs in the current frame.
    pub fn get_current_count(&self) -> i32 {
        if self.data_length == 0 {
            return 0;
        }
        self.data[self.data_length - 1]
    }

    /// Number of pairs declared in the first `depth` frames.
    pub fn get_accumulated_count(&self, depth: i32) -> i32 {
        if self.data_length == 0 || depth < 0 {
            return 0;
        }
        let mut depth = (depth as usize).min(self.depth);
        let mut accumulated_count = 0;
        let mut offset = 0;
        while depth != 0 {
            let count = self.data[offset];
            accumulated_count += count;
            offset += 2 + count as usize * 2;
            depth -= 1;
        }
        accumulated_count
    }

    pub fn push(&mut self, prefix: i32, uri: i32) {
        if self.depth == 0 {
            self.increase_depth();
        }
        self.ensure_data_capacity(2);
        let offset = self.data_length - 1;
        let count = self.data[offset];
        self.data[offset - 1 - count as usize * 2] = count + 1;
        self.data[offset] = prefix;
        self.data[offset + 1] = uri;
        self.data[offset + 2] = count + 1;
        self.data_length += 2;
    }

    /// Remove the most recent pair of the current frame. Returns false when
    /// the frame holds no pair.
    pub fn pop(&mut self) -> bool {
        if self.data_length == 0 {
            return false;
        }
        let mut offset = self.data_length - 1;
        let mut count = self.data[offset];
        if count == 0 {
            return false;
        }
        count -= 1;
        offset -= 2;
        self.data[offset] = count;
        offset -= 1 + count as usize * 2;
        self.data[offset] = count;
        self.data_length -= 2;
        true
    }

    pub fn get_prefix(&self, index: i32) -> i32 {
        self.get(index, true)
    }

    pub fn get_uri(&self, index: i32) -> i32 {
        self.get(index, false)
    }

    pub fn find_prefix(&self, uri: i32) -> i32 {
        self.find(uri, false)
    }

    pub fn find_uri(&self, prefix: i32) -> i32 {
        self.find(prefix, true)
    }

    pub fn get_depth(&self) -> usize {
        self.depth
    }

    pub fn increase_depth(&mut self) {
        self.ensure_data_capacity(2);
        let offset = self.data_length;
        self.data[offset] = 0;
        self.data[offset + 1] = 0;
        self.data_length += 2;
        self.depth += 1;
    }

    /// Drop the current frame. The outermost frame is never removed.
    pub fn decrease_depth(&mut self) {
        if self.data_length == 0 {
            return;
        }
        let offset = self.data_length - 1;
        let count = self.data[offset] as usize;
        if offset - 1 - count * 2 == 0 {
            return;
        }
        self.data_length -= 2 + count * 2;
        self.depth -= 1;
    }

    fn ensure_data_capacity(&mut self, capacity: usize) {
        let available = self.data.len() - self.data_length;
        if available > capacity {
            return;
        }
        let new_length = (self.data.len() + available) * 2;
        self.data.resize(new_length, 0);
    }

    fn find(&self, prefix_or_uri: i32, prefix: bool) -> i32 {
        if self.data_length == 0 {
            return -1;
        }
        let mut offset = self.data_length as isize - 1;
        for _ in 0..self.depth {
            let mut count = self.data[offset as usize];
            offset -= 2;
            while count != 0 {
                let pair = offset as usize;
                if prefix {
                    if self.data[pair] == prefix_or_uri {
                        return self.data[pair + 1];
                    }
                } else if self.data[pair + 1] == prefix_or_uri {
                    return self.data[pair];
                }
                offset -= 2;
                count -= 1;
            }
        }
        -1
    }

    fn get(&self, index: i32, prefix: bool) -> i32 {
        if self.data_length == 0 || index < 0 {
            return -1;
        }
        let mut index = index;
        let mut offset = 0;
        for _ in 0..self.depth {
            let count = self.data[offset];
            if index >= count {
                index -= count;
                offset += 2 + count as usize * 2;
                continue;
            }
            offset += 1 + index as usize * 2;
            if !prefix {
                offset += 1;
            }
            return self.data[offset];
        }
        -1
    }
}
