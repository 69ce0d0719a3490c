//! Wraps the blocking separation engine: lazy per-model initialization,
//! input preflight, channel normalization, and artifact writing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Settings;
use crate::engine::backend::{EngineError, EngineFactory, SeparationEngine, Stem};
use crate::engine::decode;
use crate::error::ValidationError;

pub struct SeparationEngineAdapter {
    factory: Arc<dyn EngineFactory>,
    /// Current engine slot, keyed by model selector. Requesting a different
    /// selector discards the loaded engine and reloads.
    current: Mutex<Option<(String, Arc<dyn SeparationEngine>)>>,
    max_file_size_mb: u64,
    max_duration_seconds: u64,
}

impl SeparationEngineAdapter {
    pub fn new(factory: Arc<dyn EngineFactory>, settings: &Settings) -> Self {
        Self {
            factory,
            current: Mutex::new(None),
            max_file_size_mb: settings.max_file_size_mb,
            max_duration_seconds: settings.max_audio_duration_seconds,
        }
    }

    /// Returns the engine for `model`, loading it lazily. The load runs on a
    /// blocking worker thread since model initialization is slow.
    pub async fn ensure_engine(
        &self,
        model: &str,
    ) -> Result<Arc<dyn SeparationEngine>, EngineError> {
        let mut slot = self.current.lock().await;

        if let Some((loaded, engine)) = slot.as_ref() {
            if loaded == model {
                return Ok(Arc::clone(engine));
            }
            log::info!("Switching separation model from '{}' to '{}'", loaded, model);
        } else {
            log::info!("Initializing separation engine with model '{}'", model);
        }

        let factory = Arc::clone(&self.factory);
        let requested = model.to_string();
        let engine = tokio::task::spawn_blocking(move || factory.load(&requested))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))??;

        *slot = Some((model.to_string(), Arc::clone(&engine)));
        log::info!("Separation engine ready for model '{}'", model);
        Ok(engine)
    }

    /// Runs one separation: preflight, decode, normalize, invoke, write.
    /// Returns the stem label -> artifact path mapping. The caller owns the
    /// surrounding temp resource; this method never deletes it.
    pub async fn run(
        &self,
        input_path: &Path,
        output_dir: &Path,
        model: &str,
    ) -> Result<BTreeMap<String, PathBuf>, EngineError> {
        self.preflight_size(input_path)?;

        let decode_path = input_path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || decode::decode_file(&decode_path))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))??;

        let duration = decoded.duration_seconds();
        if duration > self.max_duration_seconds as f64 {
            return Err(ValidationError::DurationExceeded {
                actual: duration,
                limit: self.max_duration_seconds,
            }
            .into());
        }

        if decoded.channels > 2 {
            return Err(ValidationError::TooManyChannels {
                channels: decoded.channels,
            }
            .into());
        }

        let waveform = decode::normalize_channels(&decoded);
        let sample_rate = waveform.sample_rate;

        let engine = self.ensure_engine(model).await?;
        log::info!(
            "Starting stem separation for {} ({:.1}s of audio)",
            input_path.display(),
            duration
        );

        let stems = tokio::task::spawn_blocking(move || engine.separate(&waveform))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))??;

        if stems.is_empty() {
            return Err(EngineError::SeparationFailed(
                "engine produced no stems".to_string(),
            ));
        }

        std::fs::create_dir_all(output_dir).map_err(|e| EngineError::OutputDirectory {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        let base_name = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio");

        let mut artifacts = BTreeMap::new();
        for stem in &stems {
            let path = write_stem(stem, output_dir, base_name, sample_rate)?;
            log::info!("Saved stem '{}' -> {}", stem.label, path.display());
            artifacts.insert(stem.label.clone(), path);
        }

        Ok(artifacts)
    }

    fn preflight_size(&self, input_path: &Path) -> Result<(), EngineError> {
        let size = std::fs::metadata(input_path)
            .map_err(|e| EngineError::Decode {
                path: input_path.to_path_buf(),
                reason: e.to_string(),
            })?
            .len();

        let limit = self.max_file_size_mb * 1024 * 1024;
        if size > limit {
            return Err(ValidationError::FileTooLarge {
                actual_mb: size as f64 / (1024.0 * 1024.0),
                limit_mb: self.max_file_size_mb,
            }
            .into());
        }
        Ok(())
    }
}

fn write_stem(
    stem: &Stem,
    output_dir: &Path,
    base_name: &str,
    sample_rate: u32,
) -> Result<PathBuf, EngineError> {
    let path = output_dir.join(format!("{}_{}.wav", base_name, stem.label));

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer =
        hound::WavWriter::create(&path, spec).map_err(|e| EngineError::WriteArtifact {
            path: path.clone(),
            source: e,
        })?;

    for &sample in &stem.samples {
        writer
            .write_sample(sample)
            .map_err(|e| EngineError::WriteArtifact {
                path: path.clone(),
                source: e,
            })?;
    }

    writer.finalize().map_err(|e| EngineError::WriteArtifact {
        path: path.clone(),
        source: e,
    })?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::StereoWaveform;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct EchoEngine {
        model: String,
    }

    impl SeparationEngine for EchoEngine {
        fn model(&self) -> &str {
            &self.model
        }

        fn separate(&self, waveform: &StereoWaveform) -> Result<Vec<Stem>, EngineError> {
            Ok(vec![
                Stem {
                    label: "vocals".to_string(),
                    samples: waveform.samples.clone(),
                },
                Stem {
                    label: "accompaniment".to_string(),
                    samples: waveform.samples.clone(),
                },
            ])
        }
    }

    struct CountingFactory {
        loads: Arc<AtomicUsize>,
    }

    impl EngineFactory for CountingFactory {
        fn load(&self, model: &str) -> Result<Arc<dyn SeparationEngine>, EngineError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoEngine {
                model: model.to_string(),
            }))
        }
    }

    fn test_adapter(loads: Arc<AtomicUsize>, settings: &Settings) -> SeparationEngineAdapter {
        SeparationEngineAdapter::new(Arc::new(CountingFactory { loads }), settings)
    }

    fn write_input_wav(path: &Path, seconds: f64) {
        let sample_rate = 44100u32;
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let frames = (seconds * sample_rate as f64) as usize;
        for i in 0..frames {
            let value = (((i % 441) as f32 / 441.0) * 10000.0) as i16;
            writer.write_sample(value).unwrap();
            writer.write_sample(-value).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn test_ensure_engine_loads_once_per_model() {
        let loads = Arc::new(AtomicUsize::new(0));
        let adapter = test_adapter(Arc::clone(&loads), &Settings::default());

        adapter.ensure_engine("2stems-16kHz").await.unwrap();
        adapter.ensure_engine("2stems-16kHz").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // A different selector discards the loaded engine.
        adapter.ensure_engine("4stems-16kHz").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);

        // Switching back reloads; the slot holds only one engine.
        let engine = adapter.ensure_engine("2stems-16kHz").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert_eq!(engine.model(), "2stems-16kHz");
    }

    #[tokio::test]
    async fn test_run_writes_named_artifacts() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("mysong.wav");
        write_input_wav(&input, 0.5);
        let output_dir = temp.path().join("output");

        let adapter = test_adapter(Arc::new(AtomicUsize::new(0)), &Settings::default());
        let artifacts = adapter
            .run(&input, &output_dir, "2stems-16kHz")
            .await
            .unwrap();

        assert_eq!(artifacts.len(), 2);
        let vocals = &artifacts["vocals"];
        assert!(vocals.ends_with("mysong_vocals.wav"));
        assert!(vocals.exists());
        assert!(artifacts["accompaniment"].exists());
        assert!(std::fs::metadata(vocals).unwrap().len() > 44);
    }

    #[tokio::test]
    async fn test_run_rejects_excessive_duration() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("long.wav");
        write_input_wav(&input, 3.0);

        let settings = Settings {
            max_audio_duration_seconds: 1,
            ..Settings::default()
        };
        let adapter = test_adapter(Arc::new(AtomicUsize::new(0)), &settings);

        let result = adapter.run(&input, &temp.path().join("out"), "2stems-16kHz").await;
        assert!(matches!(
            result,
            Err(EngineError::Validation(
                ValidationError::DurationExceeded { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_run_rejects_oversized_file() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("big.wav");
        write_input_wav(&input, 1.0);

        let settings = Settings {
            max_file_size_mb: 0,
            ..Settings::default()
        };
        let adapter = test_adapter(Arc::new(AtomicUsize::new(0)), &settings);

        let result = adapter.run(&input, &temp.path().join("out"), "2stems-16kHz").await;
        assert!(matches!(
            result,
            Err(EngineError::Validation(ValidationError::FileTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_run_surfaces_engine_failure() {
        struct FailingFactory;
        impl EngineFactory for FailingFactory {
            fn load(&self, model: &str) -> Result<Arc<dyn SeparationEngine>, EngineError> {
                Err(EngineError::LoadFailed {
                    model: model.to_string(),
                    reason: "weights missing".to_string(),
                })
            }
        }

        let temp = TempDir::new().unwrap();
        let input = temp.path().join("song.wav");
        write_input_wav(&input, 0.2);

        let adapter = SeparationEngineAdapter::new(Arc::new(FailingFactory), &Settings::default());
        let result = adapter.run(&input, &temp.path().join("out"), "2stems-16kHz").await;
        assert!(matches!(result, Err(EngineError::LoadFailed { .. })));
    }
}
