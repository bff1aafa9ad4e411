use anyhow::{anyhow, Result};

/// Shape-aware, read-only view over a flat row-major `f32` buffer.
///
/// The view borrows from the buffer that owns the frame's raw outputs, so it
/// cannot outlive that frame's processing scope.
#[derive(Clone, Debug)]
pub struct TensorView<'a> {
    data: &'a [f32],
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl<'a> TensorView<'a> {
    pub fn new(data: &'a [f32], shape: &[usize]) -> Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| anyhow!("tensor shape {:?} overflows", shape))?;
        if expected != data.len() {
            return Err(anyhow!(
                "tensor shape {:?} expects {} values, buffer holds {}",
                shape,
                expected,
                data.len()
            ));
        }
        let mut strides = vec![1usize; shape.len()];
        for axis in (0..shape.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * shape[axis + 1];
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
            strides,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn dim(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    /// Drop a leading batch axis of size 1.
    pub fn squeeze_batch(self) -> Result<Self> {
        match self.shape.first() {
            Some(1) => Ok(Self {
                data: self.data,
                shape: self.shape[1..].to_vec(),
                strides: self.strides[1..].to_vec(),
            }),
            _ => Err(anyhow!(
                "expected a batch of one, got tensor shape {:?}",
                self.shape
            )),
        }
    }

    /// Value at a full multi-index. Panics when the index is out of range.
    pub fn at(&self, index: &[usize]) -> f32 {
        debug_assert_eq!(index.len(), self.shape.len());
        let offset: usize = index
            .iter()
            .zip(&self.strides)
            .map(|(i, stride)| i * stride)
            .sum();
        self.data[offset]
    }

    /// Contiguous sub-tensor at `index` along the first axis.
    pub fn outer(&self, index: usize) -> &'a [f32] {
        let stride = self.strides.first().copied().unwrap_or(1);
        &self.data[index * stride..(index + 1) * stride]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_shape_mismatch() {
        let data = [0.0f32; 6];
        assert!(TensorView::new(&data, &[2, 4]).is_err());
        assert!(TensorView::new(&data, &[2, 3]).is_ok());
    }

    #[test]
    fn indexes_row_major() -> Result<()> {
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let view = TensorView::new(&data, &[2, 3, 4])?;
        assert_eq!(view.at(&[1, 2, 3]), 23.0);
        assert_eq!(view.at(&[0, 1, 0]), 4.0);
        assert_eq!(view.outer(1)[0], 12.0);
        Ok(())
    }

    #[test]
    fn squeezes_unit_batch_only() -> Result<()> {
        let data = [1.0f32; 8];
        let view = TensorView::new(&data, &[1, 2, 4])?.squeeze_batch()?;
        assert_eq!(view.shape(), &[2, 4]);
        assert_eq!(view.at(&[1, 3]), 1.0);
        assert!(TensorView::new(&data, &[2, 4])?.squeeze_batch().is_err());
        Ok(())
    }
}
