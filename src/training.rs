use std::ops::AddAssign;
use std::path::Path;
use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use tch::nn::{self, OptimizerConfig};
use tch::{Device, Reduction};
use crate::config::Config;
use crate::dataset::{BatchLoader, LoaderOptions, PositionDataset, SampleBatch};
use crate::network::checkpoint::{Checkpoint, OptimizerState, SchedulerState};
use crate::network::{ChessNet, PolicyValueNetwork};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossMetrics {
    pub policy_loss: f64,
    pub value_loss: f64,
    pub total_loss: f64,
}

impl LossMetrics {
    pub fn scaled(self, factor: f64) -> LossMetrics {
        LossMetrics {
            policy_loss: self.policy_loss * factor,
            value_loss: self.value_loss * factor,
            total_loss: self.total_loss * factor,
        }
    }
}

impl AddAssign for LossMetrics {
    fn add_assign(&mut self, other: LossMetrics) {
        self.policy_loss += other.policy_loss;
        self.value_loss += other.value_loss;
        self.total_loss += other.total_loss;
    }
}

/// Computes `MSE(value, outcome) + cross_entropy(policy logits, move index)` for a batch,
/// and takes an optimizer step when an optimizer is given.
pub fn run_model(
    model: &dyn PolicyValueNetwork,
    optimizer: Option<&mut nn::Optimizer>,
    batch: &SampleBatch,
    device: Device,
) -> LossMetrics {
    assert!(!batch.is_empty());
    let is_training = optimizer.is_some();

    let (positions, move_indices, outcomes) = batch.to_tensors(device);
    let (predicted_values, policy_logits) = model.forward_t(&positions, is_training);

    let value_loss = predicted_values.mse_loss(&outcomes, Reduction::Mean);
    let policy_loss = policy_logits.cross_entropy_for_logits(&move_indices);
    let total_loss = &value_loss + &policy_loss;

    if let Some(opt) = optimizer {
        opt.backward_step(&total_loss);
    }

    LossMetrics {
        policy_loss: policy_loss.double_value(&[]),
        value_loss: value_loss.double_value(&[]),
        total_loss: total_loss.double_value(&[]),
    }
}

pub fn compute_loss(model: &dyn PolicyValueNetwork, batch: &SampleBatch, device: Device) -> LossMetrics {
    tch::no_grad(|| run_model(model, None, batch, device))
}

pub fn train_batch(
    model: &dyn PolicyValueNetwork,
    optimizer: &mut nn::Optimizer,
    batch: &SampleBatch,
    device: Device,
) -> LossMetrics {
    run_model(model, Some(optimizer), batch, device)
}

/// Multiplies the learning rate by `gamma` once every `step_size` epochs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLr {
    pub base_lr: f64,
    pub step_size: u64,
    pub gamma: f64,
}

impl StepLr {
    pub fn new(base_lr: f64, step_size: u64, gamma: f64) -> StepLr {
        StepLr { base_lr, step_size: step_size.max(1), gamma }
    }

    /// Learning rate for the zero-based `epoch`.
    pub fn lr_at(&self, epoch: u64) -> f64 {
        self.base_lr * self.gamma.powi((epoch / self.step_size) as i32)
    }

    pub fn state(&self, last_epoch: u64) -> SchedulerState {
        SchedulerState {
            base_lr: self.base_lr,
            step_size: self.step_size,
            gamma: self.gamma,
            last_epoch,
        }
    }

    pub fn from_state(state: &SchedulerState) -> StepLr {
        StepLr::new(state.base_lr, state.step_size, state.gamma)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: u64,
    pub learning_rate: f64,
    pub batches: usize,
    pub mean: LossMetrics,
}

/// Runs the epoch loop described by a [`Config`].
pub struct Trainer {
    config: Config,
    device: Device,
}

impl Trainer {
    pub fn new(config: Config, device: Device) -> Trainer {
        Trainer { config, device }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn loader_options(&self) -> LoaderOptions {
        let training = &self.config.training;
        LoaderOptions {
            batch_size: training.batch_size.max(1),
            num_workers: training.num_workers,
            shuffle_buffer: training.shuffle_buffer,
            seed: training.seed,
            ..Default::default()
        }
    }

    /// Trains `net` for `training.epochs` epochs, continuing from a checkpoint when
    /// `resume_from` is given, and checkpoints every `training.save_every` epochs.
    pub fn fit(
        &self,
        net: &mut ChessNet,
        dataset: &PositionDataset,
        resume_from: Option<&Path>,
    ) -> anyhow::Result<Vec<EpochReport>> {
        let training = &self.config.training;
        if dataset.is_empty() {
            bail!("No positions loaded from dataset");
        }

        let mut scheduler = StepLr::new(training.learning_rate, training.lr_step, training.lr_gamma);
        let mut weight_decay = training.weight_decay;
        let mut steps = 0;
        let mut start_epoch = 0;

        if let Some(stem) = resume_from {
            let checkpoint = Checkpoint::load(stem, &mut net.vs, &self.config.network)
                .with_context(|| format!("Failed to resume from {}", stem.display()))?;
            scheduler = StepLr::from_state(&checkpoint.scheduler);
            weight_decay = checkpoint.optimizer.weight_decay;
            steps = checkpoint.optimizer.steps;
            start_epoch = checkpoint.epoch;
            tracing::info!("Resuming from epoch {}", start_epoch);
            tracing::warn!("Adam moment estimates are not stored in checkpoints and restart from zero");
        }

        let mut optimizer = nn::Adam { wd: weight_decay, ..Default::default() }
            .build(&net.vs, scheduler.lr_at(start_epoch))?;

        let loader = BatchLoader::new(dataset.clone(), self.loader_options());
        let num_batches = loader.num_batches();
        tracing::info!(
            "Training on {} positions from {} games, {} batches per epoch",
            dataset.len(),
            dataset.num_games(),
            num_batches,
        );
        tracing::info!("Training from epoch {} to {}", start_epoch + 1, start_epoch + training.epochs);

        let style = ProgressStyle::with_template(
            "{spinner:.green} {prefix} [{elapsed_precise}] [{bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )?
        .progress_chars("#>-");

        let mut reports = Vec::new();
        for epoch in start_epoch..start_epoch + training.epochs {
            let learning_rate = scheduler.lr_at(epoch);
            optimizer.set_lr(learning_rate);

            let progress = ProgressBar::new(num_batches as u64)
                .with_style(style.clone())
                .with_prefix(format!("Epoch {}", epoch + 1));

            let mut sum = LossMetrics::default();
            let mut batches = 0;
            for batch in loader.epoch(epoch)? {
                sum += train_batch(&*net, &mut optimizer, &batch, self.device);
                batches += 1;
                steps += 1;

                let mean = sum.scaled(1. / batches as f64);
                progress.set_message(format!(
                    "loss {:.4} value {:.4} policy {:.4}",
                    mean.total_loss, mean.value_loss, mean.policy_loss,
                ));
                progress.inc(1);
            }
            progress.finish();

            if batches == 0 {
                bail!("Epoch {} produced no batches", epoch + 1);
            }
            let mean = sum.scaled(1. / batches as f64);
            tracing::info!(
                "Epoch {} done: loss {:.4} (value {:.4}, policy {:.4}), lr {:e}",
                epoch + 1,
                mean.total_loss,
                mean.value_loss,
                mean.policy_loss,
                learning_rate,
            );

            let completed = epoch + 1;
            if training.save_every > 0 && completed % training.save_every == 0 {
                let stem = self.config.storage.checkpoint_stem(completed);
                let optimizer_state = OptimizerState {
                    learning_rate: scheduler.lr_at(completed),
                    weight_decay,
                    steps,
                };
                Checkpoint::new(completed, self.config.network, optimizer_state, scheduler.state(completed), mean.total_loss)
                    .save(&net.vs, &stem)
                    .with_context(|| format!("Failed to save checkpoint {}", stem.display()))?;
                tracing::info!("Saved checkpoint to {}", stem.display());
            }

            reports.push(EpochReport { epoch: completed, learning_rate, batches, mean });
        }

        Ok(reports)
    }
}
