#![recursion_limit = "256"]

use burn::tensor::backend::AutodiffBackend;
use clap::Parser;
use digit_classifier::{
    Error, Result,
    cli::Args,
    evaluation::evaluate_checkpoint,
    logging::install_logger,
    model::ModelConfig,
    training,
};

fn launch<B: AutodiffBackend>(args: &Args, device: B::Device) -> Result<()> {
    if args.evaluate {
        let checkpoint = args.load_model.as_ref().ok_or(Error::CheckpointRequired)?;
        evaluate_checkpoint::<B::InnerBackend>(
            checkpoint,
            args.model.config(),
            args.test_batch_size,
            args.num_workers,
            &device,
        )?;

        return Ok(());
    }

    let config = args.training_config();
    let artifact_dir = args.artifact_dir.as_str();
    let history = match &config.model {
        ModelConfig::FullyConnected(model) => {
            training::run::<B, _>(artifact_dir, &config, model.init::<B>(&device), device)
        }
        ModelConfig::Convolutional(model) => {
            training::run::<B, _>(artifact_dir, &config, model.init::<B>(&device), device)
        }
        ModelConfig::Deep(model) => {
            training::run::<B, _>(artifact_dir, &config, model.init::<B>(&device), device)
        }
    }?;

    if let Some(last) = history.epochs.last() {
        log::info!(
            "Finished {} epochs: train accuracy {:.2}%, validation accuracy {:.2}%",
            history.len(),
            last.train.accuracy,
            last.valid.accuracy
        );
    }

    Ok(())
}

#[cfg(feature = "ndarray")]
mod ndarray {
    use burn::backend::{
        Autodiff,
        ndarray::{NdArray, NdArrayDevice},
    };
    use digit_classifier::{Result, cli::Args};

    pub fn run(args: &Args) -> Result<()> {
        super::launch::<Autodiff<NdArray>>(args, NdArrayDevice::Cpu)
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{
        Autodiff,
        wgpu::{Wgpu, WgpuDevice},
    };
    use digit_classifier::{Result, cli::Args};

    pub fn run(args: &Args) -> Result<()> {
        let device = if args.no_cuda {
            WgpuDevice::Cpu
        } else {
            WgpuDevice::default()
        };

        super::launch::<Autodiff<Wgpu>>(args, device)
    }
}

#[cfg(any(feature = "tch-gpu", feature = "tch-cpu"))]
mod tch {
    use burn::backend::{
        Autodiff,
        libtorch::{LibTorch, LibTorchDevice},
    };
    use digit_classifier::{Result, cli::Args};

    #[cfg(feature = "tch-gpu")]
    fn device(no_cuda: bool) -> LibTorchDevice {
        if no_cuda {
            LibTorchDevice::Cpu
        } else if cfg!(target_os = "macos") {
            LibTorchDevice::Mps
        } else {
            LibTorchDevice::Cuda(0)
        }
    }

    #[cfg(not(feature = "tch-gpu"))]
    fn device(_no_cuda: bool) -> LibTorchDevice {
        LibTorchDevice::Cpu
    }

    pub fn run(args: &Args) -> Result<()> {
        super::launch::<Autodiff<LibTorch>>(args, device(args.no_cuda))
    }
}

#[allow(unreachable_code)]
fn main() -> Result<()> {
    install_logger();
    let args = Args::parse();
    log::debug!("{args:?}");

    // GPU-capable backends take precedence over the default CPU one.
    #[cfg(any(feature = "tch-gpu", feature = "tch-cpu"))]
    return tch::run(&args);

    #[cfg(feature = "wgpu")]
    return wgpu::run(&args);

    #[cfg(feature = "ndarray")]
    return ndarray::run(&args);

    unreachable!("At least one backend will be selected.")
}
