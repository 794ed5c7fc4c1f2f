use anyhow::{Context, bail};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};

/// Parsed device selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda(i32),
}

impl Device {
    /// Accepts `cpu`, `cuda`, `cuda:N` or a bare GPU index `N`.
    pub fn parse(selector: &str) -> anyhow::Result<Self> {
        let selector = selector.trim().to_ascii_lowercase();
        match selector.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda(0)),
            other => {
                let index = other.strip_prefix("cuda:").unwrap_or(other);
                let id: i32 = index
                    .parse()
                    .with_context(|| format!("unknown device {selector:?}"))?;
                if id < 0 {
                    bail!("invalid GPU index in device {selector:?}");
                }
                Ok(Self::Cuda(id))
            }
        }
    }

    /// Explicitly requested GPUs must register; CPU always works.
    pub fn execution_provider(self) -> ExecutionProviderDispatch {
        match self {
            Self::Cpu => CPUExecutionProvider::default().build(),
            Self::Cuda(id) => CUDAExecutionProvider::default()
                .with_device_id(id)
                .build()
                .error_on_failure(),
        }
    }
}

fn cuda_available() -> bool {
    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => available,
        Err(err) => {
            log::debug!("Could not query CUDA execution provider: {err}");
            false
        }
    }
}

/// Resolves `auto` to `cuda:0` when the CUDA provider is usable, `cpu` otherwise.
/// Any other selector is returned trimmed but unchanged.
pub fn normalize_device(device: &str) -> String {
    let device = device.trim();
    if !device.eq_ignore_ascii_case("auto") {
        return device.to_string();
    }
    let resolved = if cuda_available() { "cuda:0" } else { "cpu" };
    log::info!("Device auto resolved to {resolved}");
    resolved.to_string()
}
