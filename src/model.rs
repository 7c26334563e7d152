use candle_core::{Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Multi-layer perceptron mapping a batch of observations to one value per
/// action: `(batch, in_dim) -> (batch, nb_actions)`.
#[derive(Debug, Clone)]
pub struct QNet {
    hidden: Vec<Linear>,
    head: Linear,
    nb_actions: usize,
}

impl QNet {
    pub fn new(in_dim: usize, hidden_dims: &[usize], nb_actions: usize, vb: VarBuilder) -> Result<Self> {
        let mut hidden = Vec::with_capacity(hidden_dims.len());
        let mut dim = in_dim;
        for (i, &h) in hidden_dims.iter().enumerate() {
            hidden.push(linear(dim, h, vb.pp(format!("fc{}", i + 1)))?);
            dim = h;
        }
        let head = linear(dim, nb_actions, vb.pp("q"))?;
        Ok(Self {
            hidden,
            head,
            nb_actions,
        })
    }

    pub fn nb_actions(&self) -> usize {
        self.nb_actions
    }
}

impl Module for QNet {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for layer in &self.hidden {
            xs = layer.forward(&xs)?.relu()?;
        }
        self.head.forward(&xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_output_shape() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F64, &Device::Cpu);
        let net = QNet::new(4, &[16, 16], 3, vb).unwrap();

        let xs = Tensor::zeros((5, 4), DType::F64, &Device::Cpu).unwrap();
        let q = net.forward(&xs).unwrap();

        assert_eq!(q.dims(), &[5, 3]);
        assert_eq!(net.nb_actions(), 3);
        // two hidden layers and the head, weight + bias each
        assert_eq!(varmap.all_vars().len(), 6);
    }
}
