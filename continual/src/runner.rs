use std::{
    fs,
    path::{Path, PathBuf},
};

use config::{ExperimentConfig, MergeMethod};
use merging::{HubConfig, LoraAdapter, MergeStrategy, MergedDelta, SoupsConfig, ZipConfig};
use ndarray::{Array1, Array2};
use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use crate::checkpoint;
use crate::data::{self, MetadataTable, PatchRecord, Split};
use crate::probe::{self, Example, LoraProbe, LORA_ALPHA, LORA_RANK};
use crate::replay::ReplayBuffer;
use crate::report::{RunReport, TaskReport};
use crate::schedule::TaskSchedule;
use crate::{Result, RunError};

/// One continual-learning run: a validated configuration applied to a
/// metadata table.
pub struct Experiment {
    config: ExperimentConfig,
    table: MetadataTable,
}

impl Experiment {
    pub fn new(config: ExperimentConfig, table: MetadataTable) -> Self {
        Self { config, table }
    }

    /// Runs the experiment and writes artifacts under `save_dir`.
    ///
    /// # Errors
    /// Returns a `RunError` on sampling, merging or I/O failure.
    pub fn run(&self) -> Result<RunReport> {
        let num_workers = self.config.params.num_workers;
        if num_workers == 0 {
            return self.run_inner();
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .map_err(|e| RunError::Threads(e.to_string()))?;
        pool.install(|| self.run_inner())
    }

    fn run_inner(&self) -> Result<RunReport> {
        let p = &self.config.params;
        let backbone = self.config.model_module;
        let method = self.config.test_type;

        fs::create_dir_all(&p.save_dir).map_err(|source| RunError::Io {
            path: p.save_dir.clone(),
            source,
        })?;

        let schedule = TaskSchedule::new(&p.countries, &p.permutation)?;
        log::info!(
            "running {} over {} with {} task(s), seed {}",
            method.as_str(),
            backbone.as_str(),
            schedule.len(),
            p.seed
        );

        let base = probe::seeded_base(data::NUM_CLASSES, backbone.embed_dim(), p.seed);
        let mut replay = ReplayBuffer::new(p.memory_size, stream_seed(p.seed, 0));

        let mut adapters: Vec<LoraAdapter> = Vec::with_capacity(schedule.len());
        let mut test_sets: Vec<Vec<Example>> = Vec::with_capacity(schedule.len());
        let mut accuracy_matrix: Vec<Vec<f32>> = Vec::with_capacity(schedule.len());
        let mut tasks = Vec::with_capacity(schedule.len());

        for task in schedule.tasks() {
            let task_stream = 1 + task.step as u64 * 4;
            let mut sample_rng = StdRng::seed_from_u64(stream_seed(p.seed, task_stream));

            let sampled = data::sample_country(
                &self.table,
                &task.country,
                Split::Train,
                p.train_samples,
                p.include_snowy,
                p.include_cloudy,
                &mut sample_rng,
            )?;
            let (train_patches, val_patches) = data::train_val_split(sampled, data::TRAIN_FRAC);

            let test_patches = if p.test_samples > 0 {
                data::sample_country(
                    &self.table,
                    &task.country,
                    Split::Test,
                    p.test_samples,
                    p.include_snowy,
                    p.include_cloudy,
                    &mut sample_rng,
                )?
            } else {
                Vec::new()
            };

            let mut train_examples = self.to_examples(&train_patches);
            let replay_examples = self.to_examples(replay.as_slice());
            log::info!(
                "task {} '{}': {} train / {} val / {} test patches, {} from replay",
                task.step,
                task.country,
                train_patches.len(),
                val_patches.len(),
                test_patches.len(),
                replay_examples.len()
            );
            train_examples.extend(replay_examples);

            let val_examples = self.to_examples(&val_patches);
            test_sets.push(self.to_examples(&test_patches));

            let mut probe = LoraProbe::new(
                base.clone(),
                LORA_RANK,
                LORA_ALPHA,
                stream_seed(p.seed, task_stream + 1),
            );
            let train_loss = probe.train(
                &train_examples,
                &val_examples,
                p.epoch,
                p.batch_size,
                p.lr as f32,
                stream_seed(p.seed, task_stream + 2),
                p.log_every_step,
            );
            let val_accuracy = probe::micro_accuracy(&probe.effective_weight(), &val_examples);

            let adapter = probe.adapter(task.country.clone());
            self.save_adapter(&p.save_dir, &adapter)?;
            adapters.push(adapter);

            replay.extend(train_patches);

            let merged = self.merge(
                &adapters,
                &base,
                &val_examples,
                stream_seed(p.seed, task_stream + 3),
            )?;
            self.save_merged(&p.save_dir, task.step, &merged)?;
            log::debug!("merged library as {} after task {}", merged.name, task.step);

            let mut merged_w = merged.delta;
            merged_w += &base;
            let row: Vec<f32> = test_sets
                .par_iter()
                .map(|examples| probe::micro_accuracy(&merged_w, examples))
                .collect();

            log::info!(
                "task {} '{}': train loss {:.4}, val acc {:.4}, merged acc {:?}",
                task.step,
                task.country,
                train_loss,
                val_accuracy,
                row
            );

            accuracy_matrix.push(row);
            tasks.push(TaskReport {
                step: task.step,
                country: task.country.clone(),
                train_loss,
                val_accuracy,
                merged_accuracy: accuracy_matrix[task.step].clone(),
            });
        }

        let (average_accuracy, backward_transfer) = RunReport::summarize(&accuracy_matrix);
        let report = RunReport {
            test_type: method.as_str().to_string(),
            model_module: backbone.as_str().to_string(),
            seed: p.seed,
            params: p.clone(),
            task_order: schedule.tasks().iter().map(|t| t.country.clone()).collect(),
            tasks,
            accuracy_matrix,
            average_accuracy,
            backward_transfer,
        };

        let report_path = self.report_path();
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(&report_path, json).map_err(|source| RunError::Io {
            path: report_path.clone(),
            source,
        })?;
        log::info!(
            "report written to '{}': avg acc {:.4}, backward transfer {:.4}",
            report_path.display(),
            average_accuracy,
            backward_transfer
        );

        Ok(report)
    }

    /// Where `run` writes the report.
    pub fn report_path(&self) -> PathBuf {
        self.config.params.save_dir.join("report.json")
    }

    fn to_examples(&self, patches: &[PatchRecord]) -> Vec<Example> {
        let backbone = self.config.model_module;
        let seed = self.config.params.seed;
        patches
            .par_iter()
            .map(|patch| {
                let x = data::embed(backbone, seed, &patch.patch_id);
                let y = Array1::from_iter(patch.labels.iter().map(|&l| f32::from(u8::from(l))));
                Example { x, y }
            })
            .collect()
    }

    fn merge(
        &self,
        adapters: &[LoraAdapter],
        base: &Array2<f32>,
        few_shot: &[Example],
        seed: u64,
    ) -> Result<MergedDelta> {
        let strategy = match self.config.test_type {
            MergeMethod::LoraSoups => MergeStrategy::Soups(SoupsConfig::default()),
            MergeMethod::ZipLora => MergeStrategy::Zip(ZipConfig { seed, ..ZipConfig::default() }),
            MergeMethod::LoraHub => MergeStrategy::Hub(HubConfig { seed, ..HubConfig::default() }),
        };
        let merged = strategy.merge(adapters, |delta| {
            let mut w = delta.clone();
            w += base;
            probe::bce_loss(&w, few_shot)
        })?;
        Ok(merged)
    }

    fn save_adapter(&self, save_dir: &Path, adapter: &LoraAdapter) -> Result<()> {
        let path = save_dir.join(format!("adapter_{}.safetensors", adapter.task));
        checkpoint::save_tensors(
            &path,
            &[
                ("down".to_string(), &adapter.down),
                ("up".to_string(), &adapter.up),
            ],
        )
    }

    fn save_merged(&self, save_dir: &Path, step: usize, merged: &MergedDelta) -> Result<()> {
        let path = save_dir.join(format!("merged_{step}.safetensors"));
        checkpoint::save_tensors(&path, &[("delta".to_string(), &merged.delta)])
    }
}

/// Derives an independent seed stream from the master seed.
fn stream_seed(seed: u64, stream: u64) -> u64 {
    seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(23)
}
