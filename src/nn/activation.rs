use crate::error::{Error, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Per-layer activation. The integer codes are part of the model file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Sigmoid,
    Tanh,
    Relu,
    LeakyRelu,
    Softmax,
}

pub const LEAKY_SLOPE: f64 = 0.001;

impl Activation {
    pub fn code(self) -> i64 {
        match self {
            Activation::Identity => 0,
            Activation::Sigmoid => 1,
            Activation::Tanh => 2,
            Activation::Relu => 3,
            Activation::LeakyRelu => 4,
            Activation::Softmax => 5,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        Ok(match code {
            0 => Activation::Identity,
            1 => Activation::Sigmoid,
            2 => Activation::Tanh,
            3 => Activation::Relu,
            4 => Activation::LeakyRelu,
            5 => Activation::Softmax,
            other => return Err(Error::UnknownActivation(other)),
        })
    }

    pub fn apply(self, row: &mut Array1<f64>) {
        match self {
            Activation::Identity => {}
            Activation::Sigmoid => row.mapv_inplace(|x| 1.0 / (1.0 + (-x).exp())),
            Activation::Tanh => row.mapv_inplace(f64::tanh),
            Activation::Relu => row.mapv_inplace(|x| x.max(0.0)),
            Activation::LeakyRelu => row.mapv_inplace(|x| if x > 0.0 { x } else { x * LEAKY_SLOPE }),
            Activation::Softmax => {
                // shifting by the max leaves e^x / sum(e^x) unchanged and keeps exp finite
                let max = row.fold(f64::NEG_INFINITY, |m, &x| m.max(x));
                row.mapv_inplace(|x| (x - max).exp());
                let sum = row.sum();
                row.mapv_inplace(|x| x / sum);
            }
        }
    }
}
