use crate::Idx2d;

/// 行优先索引迭代器.
///
/// 用 `flat_map` 也能组合出等价的迭代器, 但那个迭代器对象的体积
/// 是手写 `PosIter` 的三倍. 标记-过滤阶段会对每个切片完整走一遍索引,
/// 因此保留该手写结构.
#[derive(Debug)]
pub struct PosIter {
    cur_h: usize,
    cur_w: usize,
    h: usize,
    w: usize,
}

impl PosIter {
    #[inline]
    pub fn new((h, w): Idx2d) -> Self {
        Self {
            cur_h: 0,
            cur_w: 0,
            h,
            w,
        }
    }
}

impl Iterator for PosIter {
    type Item = Idx2d;

    fn next(&mut self) -> Option<Self::Item> {
        if self.h == 0 || self.w == 0 || self.cur_h == self.h {
            return None;
        }
        let ret_pos = (self.cur_h, self.cur_w);
        if self.cur_w + 1 == self.w {
            self.cur_w = 0;
            self.cur_h += 1;
        } else {
            self.cur_w += 1;
        }
        Some(ret_pos)
    }
}

/// 该测试已足够覆盖所有情况, 不用变更.
#[cfg(test)]
mod completeness_tests {
    use super::PosIter;
    use crate::Idx2d;

    fn pos_iter_builtin((h, w): Idx2d) -> impl Iterator<Item = Idx2d> {
        (0..h).flat_map(move |first| (0..w).map(move |second| (first, second)))
    }

    #[test]
    fn test_pos_iter() {
        // 这几个基本例子足以证明正确性了.
        for i in 0..=4 {
            for j in 0..=4 {
                let tup = (i, j);
                assert!(Iterator::eq(pos_iter_builtin(tup), PosIter::new(tup)));
            }
        }
    }
}
