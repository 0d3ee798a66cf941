use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn::config::Config;
use burn::tensor::backend::Backend as BackendTrait;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use mseg_io::archive::{ArchiveManager, DatasetArchive};
use mseg_train::data::{index_task, random_split, split_counts};
use mseg_train::{
    evaluate_dice, predict, summarize, CheckpointManager, DataModuleConfig, MedicalDecathlonDataModule, SegmentationModel, Trainer, TrainingConfig,
};

#[cfg(not(feature = "wgpu"))]
type Backend = burn::backend::NdArray<f32>;
#[cfg(feature = "wgpu")]
type Backend = burn::backend::Wgpu;

type TrainBackend = Autodiff<Backend>;

const DEFAULT_TASK: &str = "Task04_Hippocampus";

#[derive(Parser)]
#[command(name = "mseg")]
#[command(about = "Hippocampus segmentation with a 3D U-Net")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct DataArgs {
    /// Directory holding the extracted task
    #[arg(short, long, default_value = "data")]
    root: PathBuf,

    /// Decathlon task name
    #[arg(short, long, default_value = DEFAULT_TASK)]
    task: String,
}

#[derive(Args, Clone)]
struct LoaderArgs {
    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    #[arg(long, default_value_t = 0.8)]
    train_val_ratio: f64,

    /// Seed of the train/validation split and augmentation
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Threads loading subjects
    #[arg(long, default_value_t = 1)]
    num_workers: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and extract a task archive
    Download {
        #[command(flatten)]
        data: DataArgs,

        /// Force re-download even if the task directory exists
        #[arg(short, long)]
        force: bool,
    },

    /// List known task archives
    ListDatasets,

    /// Count the NIfTI files of an extracted task
    Verify {
        #[command(flatten)]
        data: DataArgs,
    },

    /// Show the train/validation split
    Split {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long, default_value_t = 0.8)]
        train_val_ratio: f64,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Train a U-Net
    Train {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        loader: LoaderArgs,

        /// Saved training configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overrides the configured checkpoint directory
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,

        /// Overrides the configured epoch limit
        #[arg(long)]
        max_epochs: Option<usize>,

        /// Disable random augmentation
        #[arg(long)]
        no_augment: bool,
    },

    /// Report Dice per subject and label on the validation split
    Evaluate {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        loader: LoaderArgs,

        #[arg(long, default_value = "checkpoints")]
        checkpoint_dir: PathBuf,

        /// Write the per-subject records as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write label maps for the test images
    Predict {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        loader: LoaderArgs,

        #[arg(long, default_value = "checkpoints")]
        checkpoint_dir: PathBuf,

        #[arg(short, long, default_value = "predictions")]
        output: PathBuf,
    },

    /// Remove an extracted task and its archive
    Clean {
        #[command(flatten)]
        data: DataArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Download { data, force } => download(&data, force)?,
        Commands::ListDatasets => list_datasets(),
        Commands::Verify { data } => verify(&data)?,
        Commands::Split {
            data,
            train_val_ratio,
            seed,
        } => split(&data, train_val_ratio, seed)?,
        Commands::Train {
            data,
            loader,
            config,
            checkpoint_dir,
            max_epochs,
            no_augment,
        } => train(&data, &loader, config.as_deref(), checkpoint_dir, max_epochs, no_augment)?,
        Commands::Evaluate {
            data,
            loader,
            checkpoint_dir,
            output,
        } => evaluate(&data, &loader, &checkpoint_dir, output.as_deref())?,
        Commands::Predict {
            data,
            loader,
            checkpoint_dir,
            output,
        } => run_predict(&data, &loader, &checkpoint_dir, &output)?,
        Commands::Clean { data } => ArchiveManager::new(&data.root).clean(&data.task)?,
    }

    Ok(())
}

fn archive(task: &str) -> Result<DatasetArchive> {
    DatasetArchive::find(task)
        .with_context(|| format!("Unknown task: {}. Use 'list-datasets' to see available options.", task))
}

fn data_config(data: &DataArgs, loader: &LoaderArgs) -> Result<DataModuleConfig> {
    let archive = archive(&data.task)?;
    let mut config = DataModuleConfig::new(archive.task, archive.file_id, data.root.clone())
        .with_batch_size(loader.batch_size)
        .with_train_val_ratio(loader.train_val_ratio)
        .with_seed(loader.seed)
        .with_num_workers(loader.num_workers);
    config.sha256 = archive.sha256;
    Ok(config)
}

fn data_module<B: BackendTrait>(
    config: DataModuleConfig,
    device: B::Device,
) -> Result<MedicalDecathlonDataModule<B>> {
    let mut data = MedicalDecathlonDataModule::new(config, device);
    data.prepare_data()?;
    data.setup()?;
    Ok(data)
}

fn download(data: &DataArgs, force: bool) -> Result<()> {
    let manager = ArchiveManager::new(&data.root);
    let task_dir = manager.acquire(&archive(&data.task)?, force)?;
    info!("Task available at {}", task_dir.display());
    Ok(())
}

fn list_datasets() {
    println!("Available datasets:");
    println!();
    for archive in DatasetArchive::known() {
        println!("  {:<20} - {}", archive.task, archive.description);
        println!("  {:<20}   {}", "", archive.url());
        println!();
    }
}

fn verify(data: &DataArgs) -> Result<()> {
    let summary = ArchiveManager::new(&data.root).verify(&data.task)?;
    println!(
        "{}: {} training images, {} training labels, {} test images",
        data.task, summary.images_tr, summary.labels_tr, summary.images_ts
    );
    Ok(())
}

fn split(data: &DataArgs, ratio: f64, seed: u64) -> Result<()> {
    let indexed = index_task(&data.root, &data.task)?;
    let (n_train, n_val) = split_counts(indexed.training.len(), ratio)?;
    let (train, val) = random_split(&indexed.training, ratio, seed)?;

    println!("train ({}):", n_train);
    for record in &train {
        println!("  {}", record.id());
    }
    println!("validation ({}):", n_val);
    for record in &val {
        println!("  {}", record.id());
    }
    println!("test: {}", indexed.test.len());
    Ok(())
}

fn train(
    data: &DataArgs,
    loader: &LoaderArgs,
    config_path: Option<&Path>,
    checkpoint_dir: Option<PathBuf>,
    max_epochs: Option<usize>,
    no_augment: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => TrainingConfig::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?,
        None => TrainingConfig::new(),
    };
    if let Some(dir) = checkpoint_dir {
        config.checkpoint_dir = dir;
    }
    if let Some(epochs) = max_epochs {
        config.max_epochs = epochs;
    }

    let device = Default::default();
    let data_config = data_config(data, loader)?
        .with_augment(!no_augment)
        .with_num_classes(config.model.out_channels)
        .with_shape_multiple(config.model.stride_product());
    let data = data_module::<TrainBackend>(data_config, device)?;

    let trainer = Trainer::<TrainBackend>::new(config, Default::default())?;
    let (_, summary) = trainer.fit(trainer.init_model(), &data)?;

    info!(
        "Trained {} epochs in {:.1}s, best val_loss {:.4} at epoch {}",
        summary.epochs_run,
        summary.duration.as_secs_f64(),
        summary.best_val_loss,
        summary.best_epoch
    );
    info!("Checkpoint saved to {}", trainer.checkpoints().dir().display());
    Ok(())
}

fn load_model(
    checkpoint_dir: &Path,
    device: &<Backend as BackendTrait>::Device,
) -> Result<(SegmentationModel<Backend>, TrainingConfig)> {
    let checkpoints = CheckpointManager::new(checkpoint_dir);
    let config = checkpoints.load_config()?;
    let network = checkpoints.load_network::<Backend>(&config.model, device)?;
    let model = SegmentationModel::from_network(
        network,
        config.loss.init(),
        config.learning_rate,
        config.model.stride_product(),
    );
    Ok((model, config))
}

fn evaluate(data: &DataArgs, loader: &LoaderArgs, checkpoint_dir: &Path, output: Option<&Path>) -> Result<()> {
    let device = Default::default();
    let (model, config) = load_model(checkpoint_dir, &device)?;
    let data_config = data_config(data, loader)?
        .with_augment(false)
        .with_num_classes(config.model.out_channels)
        .with_shape_multiple(config.model.stride_product());
    let data = data_module::<Backend>(data_config, device)?;

    let records = evaluate_dice(&model, &data.val_loader()?)?;
    for record in &records {
        println!("{:<24} {:<12} {:.4}", record.subject, record.label, record.dice);
    }
    println!();
    for summary in summarize(&records) {
        println!(
            "{:<12} mean {:.4}  min {:.4}  max {:.4}  (n = {})",
            summary.label, summary.mean, summary.min, summary.max, summary.count
        );
    }

    if let Some(path) = output {
        let file = std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &records)?;
        info!("Wrote {} records to {}", records.len(), path.display());
    }
    Ok(())
}

fn run_predict(data: &DataArgs, loader: &LoaderArgs, checkpoint_dir: &Path, output: &Path) -> Result<()> {
    let device = Default::default();
    let (model, config) = load_model(checkpoint_dir, &device)?;
    let data_config = data_config(data, loader)?
        .with_augment(false)
        .with_num_classes(config.model.out_channels)
        .with_shape_multiple(config.model.stride_product());
    let data = data_module::<Backend>(data_config, device)?;

    let written = predict(&model, &data.test_loader()?, output)?;
    println!("Wrote {} label maps to {}", written.len(), output.display());
    Ok(())
}
