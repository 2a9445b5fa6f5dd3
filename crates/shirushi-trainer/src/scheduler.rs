//! Multi-task training scheduler.
//!
//! Coordinates N labeling tasks sharing one encoder. Each epoch shuffles
//! every task's training data, splits it into shards, and interleaves
//! shard-sized batches across tasks so the shared parameters receive
//! gradient signal from every task within the epoch instead of training one
//! task to convergence before the next. One sentence is composed, encoded,
//! and scored end-to-end at a time; batching accumulates losses across
//! sentences before a single optimizer step, and that step is the only
//! writer to the shared parameter tables.

use std::path::Path;

use candle_core::Tensor;
use candle_nn::optim::{Optimizer, SGD};
use oorandom::Rand32;
use serde::{Deserialize, Serialize};
use shirushi_core::{
    CharVocabulary, InferenceMode, Model, ModelConfig, PretrainedEmbeddings, TagDictionary,
    TaskSpec, load_doc_frequencies,
};
use tracing::info;

use crate::config::{TaskConfig, TrainingConfig};
use crate::data::{Sentence, load_conll, write_predictions};
use crate::eval::accuracy;

/// One sentence with its gold tags resolved to indices.
#[derive(Debug, Clone)]
struct Example {
    words: Vec<String>,
    gold: Vec<usize>,
}

/// Loaded datasets and tag dictionary of one task.
struct TaskState {
    config: TaskConfig,
    tags: TagDictionary,
    train: Vec<Example>,
    dev: Vec<Example>,
    test: Vec<Example>,
}

impl TaskState {
    fn load(config: TaskConfig) -> anyhow::Result<Self> {
        let train = load_conll(&config.train)?;
        let dev = load_conll(&config.dev)?;
        let test = load_conll(&config.test)?;

        // The union of all gold tags, so evaluation never meets an unknown
        // index. Frozen from here on.
        let tags = TagDictionary::from_tags(
            train
                .iter()
                .chain(&dev)
                .chain(&test)
                .flat_map(|s| s.tags.iter().cloned()),
        )?;

        info!(
            task = %config.name,
            train = train.len(),
            dev = dev.len(),
            test = test.len(),
            tags = tags.real_tag_count(),
            "loaded task data"
        );

        Ok(Self {
            train: index_examples(&train, &tags)?,
            dev: index_examples(&dev, &tags)?,
            test: index_examples(&test, &tags)?,
            tags,
            config,
        })
    }
}

/// Dictionary sidecar saved next to the weights so a trained model can be
/// rebuilt for inference.
#[derive(Serialize, Deserialize)]
struct ModelMeta {
    model: ModelConfig,
    chars: CharVocabulary,
    tasks: Vec<TaskMeta>,
}

#[derive(Serialize, Deserialize)]
struct TaskMeta {
    name: String,
    mode: InferenceMode,
    tags: TagDictionary,
}

/// Orchestrates multi-task training of one shared model.
pub struct TrainingScheduler {
    config: TrainingConfig,
    model: Model,
    tasks: Vec<TaskState>,
    chars: CharVocabulary,
    rng: Rand32,
}

impl TrainingScheduler {
    /// Load every resource the config names and build the shared model.
    pub fn new(config: TrainingConfig) -> anyhow::Result<Self> {
        let restriction = match &config.doc_frequencies {
            Some(path) => Some(load_doc_frequencies(path, config.min_word_freq)?),
            None => None,
        };
        let pretrained = PretrainedEmbeddings::load(&config.embeddings, restriction.as_ref())?;

        let mut tasks = Vec::with_capacity(config.tasks.len());
        for task_config in &config.tasks {
            tasks.push(TaskState::load(task_config.clone())?);
        }

        let chars = CharVocabulary::from_corpus(
            tasks
                .iter()
                .flat_map(|t| t.train.iter())
                .flat_map(|ex| ex.words.iter())
                .map(String::as_str),
        );

        let specs = tasks
            .iter()
            .map(|t| TaskSpec {
                name: t.config.name.clone(),
                tags: t.tags.clone(),
                mode: t.config.mode,
            })
            .collect();
        let model = Model::new(&config.model_config(), &pretrained, chars.clone(), specs)?;

        let rng = Rand32::new(config.seed);
        Ok(Self {
            config,
            model,
            tasks,
            chars,
            rng,
        })
    }

    /// The shared model under training.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Run the full schedule, then evaluate test sets and persist results.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut optimizer = SGD::new(self.model.trainable_vars(), self.config.learning_rate)?;

        for epoch in 0..self.config.epochs {
            self.run_epoch(&mut optimizer, epoch)?;
            for (head, task) in self.tasks.iter().enumerate() {
                let (tokens, correct) = evaluate(&self.model, head, &task.dev)?;
                info!(
                    task = %task.config.name,
                    epoch = epoch + 1,
                    tokens,
                    accuracy = ratio(tokens, correct),
                    "dev evaluation"
                );
            }
        }

        self.finish()
    }

    /// One epoch of interleaved shard training.
    fn run_epoch(&mut self, optimizer: &mut SGD, epoch: usize) -> anyhow::Result<()> {
        for task in self.tasks.iter_mut() {
            shuffle(&mut task.train, &mut self.rng);
        }

        let shards = self.config.shards_per_epoch;
        let mut total_loss = 0f32;
        let mut sentences = 0usize;

        for shard in 0..shards {
            for (head, task) in self.tasks.iter().enumerate() {
                let count = task.train.len();
                let start = shard * count / shards;
                let end = (shard + 1) * count / shards;

                let mut batch: Vec<Tensor> = Vec::with_capacity(self.config.batch_size);
                for example in &task.train[start..end] {
                    let loss = self.model.loss(head, &example.words, &example.gold)?;
                    // The task weight scales its pull on the shared parameters.
                    let weighted = loss.affine(task.config.weight as f64, 0.0)?;
                    total_loss += weighted.to_scalar::<f32>()?;
                    sentences += 1;

                    batch.push(weighted);
                    if batch.len() == self.config.batch_size {
                        step(optimizer, &batch)?;
                        batch.clear();
                    }
                }
                if !batch.is_empty() {
                    step(optimizer, &batch)?;
                }
            }
        }

        let mean_loss = if sentences > 0 {
            total_loss / sentences as f32
        } else {
            0.0
        };
        info!(epoch = epoch + 1, sentences, mean_loss, "epoch complete");
        Ok(())
    }

    /// Test evaluation, prediction files, model persistence.
    fn finish(&self) -> anyhow::Result<()> {
        for (head, task) in self.tasks.iter().enumerate() {
            let (tokens, correct) = evaluate(&self.model, head, &task.test)?;
            info!(
                task = %task.config.name,
                tokens,
                accuracy = ratio(tokens, correct),
                "test evaluation"
            );
        }

        if let Some(dir) = &self.config.predictions_dir {
            std::fs::create_dir_all(dir)?;
            for (head, task) in self.tasks.iter().enumerate() {
                self.write_task_predictions(head, task, dir)?;
            }
        }

        if let Some(path) = &self.config.model_path {
            self.save(path)?;
        }
        Ok(())
    }

    fn write_task_predictions(
        &self,
        head: usize,
        task: &TaskState,
        dir: &Path,
    ) -> anyhow::Result<()> {
        let mut sentences = Vec::with_capacity(task.test.len());
        let mut predictions = Vec::with_capacity(task.test.len());

        for example in &task.test {
            let predicted = self.model.predict(head, &example.words)?;
            let predicted: Vec<String> = predicted
                .iter()
                .map(|&index| tag_string(&task.tags, index))
                .collect();
            let golds: Vec<String> = example
                .gold
                .iter()
                .map(|&index| {
                    task.tags
                        .index_to_tag(index)
                        .expect("gold indices map to real tags")
                        .to_string()
                })
                .collect();
            sentences.push(Sentence::new(example.words.clone(), golds));
            predictions.push(predicted);
        }

        let path = dir.join(format!("{}.test.pred", task.config.name));
        write_predictions(&path, &sentences, &predictions)?;
        info!(task = %task.config.name, path = %path.display(), "wrote test predictions");
        Ok(())
    }

    fn save(&self, path: &Path) -> anyhow::Result<()> {
        self.model.save_weights(path)?;

        let meta = ModelMeta {
            model: self.config.model_config(),
            chars: self.chars.clone(),
            tasks: self
                .tasks
                .iter()
                .map(|t| TaskMeta {
                    name: t.config.name.clone(),
                    mode: t.config.mode,
                    tags: t.tags.clone(),
                })
                .collect(),
        };
        let sidecar = path.with_extension("json");
        std::fs::write(&sidecar, serde_json::to_string_pretty(&meta)?)?;

        info!(weights = %path.display(), sidecar = %sidecar.display(), "saved model");
        Ok(())
    }
}

/// Printable form of any tag index. An undertrained head can still decode
/// to a pseudo-tag; the output keeps it visible instead of masking it.
fn tag_string(tags: &TagDictionary, index: usize) -> String {
    match tags.index_to_tag(index) {
        Some(tag) => tag.to_string(),
        None if index == tags.start_index() => "<START>".into(),
        None => "<STOP>".into(),
    }
}

fn index_examples(sentences: &[Sentence], tags: &TagDictionary) -> anyhow::Result<Vec<Example>> {
    sentences
        .iter()
        .map(|sentence| {
            let gold = sentence
                .tags
                .iter()
                .map(|tag| tags.tag_to_index(tag))
                .collect::<shirushi_core::Result<Vec<_>>>()?;
            Ok(Example {
                words: sentence.words.clone(),
                gold,
            })
        })
        .collect()
}

fn evaluate(model: &Model, head: usize, examples: &[Example]) -> anyhow::Result<(usize, usize)> {
    let mut tokens = 0;
    let mut correct = 0;
    for example in examples {
        let predicted = model.predict(head, &example.words)?;
        let (n, c) = accuracy(&example.gold, &predicted)?;
        tokens += n;
        correct += c;
    }
    Ok((tokens, correct))
}

fn ratio(tokens: usize, correct: usize) -> f32 {
    if tokens == 0 {
        0.0
    } else {
        correct as f32 / tokens as f32
    }
}

/// Fisher-Yates driven by the scheduler's seeded stream.
fn shuffle(examples: &mut [Example], rng: &mut Rand32) {
    for i in (1..examples.len()).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        examples.swap(i, j);
    }
}

/// Sum the accumulated losses and apply one parameter update.
fn step(optimizer: &mut SGD, losses: &[Tensor]) -> anyhow::Result<()> {
    let mut total = losses[0].clone();
    for loss in &losses[1..] {
        total = total.add(loss)?;
    }
    optimizer.backward_step(&total)?;
    Ok(())
}
