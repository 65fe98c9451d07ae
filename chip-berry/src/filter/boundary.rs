//! 边界条带剔除 (流水线阶段 4).

use crate::consts::mask::CHIP_BACKGROUND;
use crate::filter::BorderWidths;
use crate::BinSliceMut;
use ndarray::s;

impl BinSliceMut<'_> {
    /// 把切片四周指定宽度的边界条带整体涂为背景.
    ///
    /// 宽度以图像尺寸为上限饱和: 某一侧宽度达到或超过对应维度时,
    /// 该维度被整体涂黑, 不发生越界. 宽度为 0 的一侧不做任何修改.
    pub fn cull_border(&mut self, widths: &BorderWidths) {
        let (h_len, w_len) = self.shape();
        let (left, top, right, bottom) = widths.resolve();

        let left = left.min(w_len);
        let right = right.min(w_len);
        let top = top.min(h_len);
        let bottom = bottom.min(h_len);

        let mut view = self.array_view_mut();
        view.slice_mut(s![.., ..left]).fill(CHIP_BACKGROUND);
        view.slice_mut(s![.., w_len - right..]).fill(CHIP_BACKGROUND);
        view.slice_mut(s![..top, ..]).fill(CHIP_BACKGROUND);
        view.slice_mut(s![h_len - bottom.., ..]).fill(CHIP_BACKGROUND);
    }
}
