use ndarray::Array4;
use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor};

use super::{InferenceError, InferenceModel};

/// TorchScript network loaded through libtorch. The forward pass is
/// serialized behind a mutex; preprocessing happens outside the lock.
pub struct TorchModel {
    module: Mutex<CModule>,
    device: Device,
    apply_softmax: bool,
}

impl TorchModel {
    pub fn load(model_path: &Path, apply_softmax: bool) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let module = CModule::load_on_device(model_path, device)
            .map_err(|e| InferenceError::Model(format!("{}: {}", model_path.display(), e)))?;
        log::info!("Loaded model {} on {:?}", model_path.display(), device);
        Ok(Self {
            module: Mutex::new(module),
            device,
            apply_softmax,
        })
    }
}

impl InferenceModel for TorchModel {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let contiguous = input.as_standard_layout();
        let data = contiguous
            .as_slice()
            .ok_or_else(|| InferenceError::Preprocessing("tensor is not contiguous".into()))?;
        let tensor = Tensor::from_slice(data)
            .view(shape.as_slice())
            .to_device(self.device);

        let output = {
            let module = self
                .module
                .lock()
                .map_err(|_| InferenceError::Model("model lock poisoned".into()))?;
            tch::no_grad(|| module.forward_ts(&[tensor]))
                .map_err(|e| InferenceError::Model(e.to_string()))?
        };

        let output = if self.apply_softmax {
            output.softmax(-1, Kind::Float)
        } else {
            output
        };
        let output_flat = output
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .view([-1]);
        Vec::<f32>::try_from(&output_flat).map_err(|e| InferenceError::Model(e.to_string()))
    }
}
