//! Analysis lifecycle
//!
//! One analysis is one inference attempt against one completed source
//! document. The record is persisted as `processing` before any external
//! call, then written exactly once more with its terminal state. Report
//! generation runs after the terminal write and can never change it.

mod extract;
mod prompt;
mod report;

pub use extract::{FindingsExtractor, KeywordExtractor};
pub use prompt::PromptBuilder;
pub use report::{PdfReportRenderer, ReportContext, ReportRenderer};

use crate::access::authorize_patient;
use crate::config::AnalysisConfig;
use crate::db::RecordStore;
use crate::domain::{AiAnalysis, AnalysisResult, AnalysisStatus, DocumentType, Patient, UploadRecord, UploadStatus, User};
use crate::errors::{AppError, Result};
use crate::inference::InferenceClient;
use crate::metrics;
use crate::storage::{storage_key, ObjectStore};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct AnalysisService {
    store: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    inference: Arc<dyn InferenceClient>,
    extractor: Arc<dyn FindingsExtractor>,
    renderer: Arc<dyn ReportRenderer>,
    prompts: PromptBuilder,
    inference_timeout: Duration,
    stale_after: Duration,
}

impl AnalysisService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        inference: Arc<dyn InferenceClient>,
        config: &AnalysisConfig,
        inference_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            store,
            objects,
            inference,
            extractor: Arc::new(KeywordExtractor::new()?),
            renderer: Arc::new(PdfReportRenderer),
            prompts: PromptBuilder::new(config.prompt_excerpt_chars),
            inference_timeout,
            stale_after: config.stale_after(),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FindingsExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Run one analysis of `upload_id` to a terminal state.
    ///
    /// Precondition failures are errors and leave nothing behind. Once the
    /// record exists, processing failures are recorded on it and the record
    /// is returned.
    #[instrument(skip(self, requester), fields(requester = %requester.id))]
    pub async fn start_analysis(&self, requester: &User, upload_id: Uuid) -> Result<AiAnalysis> {
        let upload = self
            .store
            .find_upload(upload_id)
            .await?
            .ok_or_else(|| AppError::UploadNotFound {
                id: upload_id.to_string(),
            })?;
        let patient = self.load_patient(upload.patient_id).await?;
        authorize_patient(requester, &patient)?;

        if upload.document_type != DocumentType::UserUploaded {
            return Err(AppError::Conflict {
                message: "generated reports cannot be analyzed".to_string(),
            });
        }
        if upload.status != UploadStatus::Completed {
            return Err(AppError::Conflict {
                message: format!("upload {} is {}, not completed", upload.id, upload.status),
            });
        }

        let mut analysis =
            AiAnalysis::new(patient.id, upload.id, requester.id, self.inference.model_name());
        analysis.begin_processing(Utc::now())?;
        self.store.insert_analysis(&analysis).await?;
        info!(analysis_id = %analysis.analysis_id, upload_id = %upload.id, "Analysis started");

        let started = Instant::now();
        let outcome = self.run(&upload).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &outcome {
            Ok(result) => analysis.complete(result.clone(), Utc::now())?,
            Err(e) => analysis.fail(&e.to_string(), Utc::now())?,
        }

        if !self
            .store
            .update_analysis_from(&analysis, AnalysisStatus::Processing)
            .await?
        {
            // The sweeper settled the record first; its terminal state stands
            warn!(analysis_id = %analysis.analysis_id, "Analysis already settled; discarding late outcome");
            return self.reload(&analysis.analysis_id).await;
        }

        match outcome {
            Ok(_) => {
                metrics::record_analysis_outcome("completed", elapsed);
                info!(analysis_id = %analysis.analysis_id, "Analysis completed");

                if let Err(e) = self.attach_report(&mut analysis, &patient, requester, &upload).await {
                    metrics::record_report_failure();
                    warn!(
                        analysis_id = %analysis.analysis_id,
                        error = %e,
                        "Report generation failed; analysis stays completed"
                    );
                }
            }
            Err(e) => {
                metrics::record_analysis_outcome("failed", elapsed);
                warn!(
                    analysis_id = %analysis.analysis_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Analysis failed"
                );
            }
        }

        Ok(analysis)
    }

    /// Storage read, prompt, inference, extraction
    async fn run(&self, upload: &UploadRecord) -> Result<AnalysisResult> {
        let content = tokio::time::timeout(self.inference_timeout, self.objects.get_object(&upload.storage_key))
            .await
            .map_err(|_| AppError::StorageRead {
                key: upload.storage_key.clone(),
                message: format!("read timed out after {}ms", self.inference_timeout.as_millis()),
            })??;
        if content.is_empty() {
            return Err(AppError::StorageRead {
                key: upload.storage_key.clone(),
                message: "object is empty".to_string(),
            });
        }

        let prompt = self.prompts.build(upload, &content);
        let model = self.inference.model_name().to_string();
        let started = Instant::now();

        let generated = tokio::time::timeout(self.inference_timeout, self.inference.generate(&prompt))
            .await
            .map_err(|_| AppError::InferenceTimeout {
                timeout_ms: self.inference_timeout.as_millis() as u64,
            })
            .and_then(|inner| inner);
        metrics::record_inference(started.elapsed().as_secs_f64(), &model, generated.is_ok());

        let generated = generated?;
        if generated.trim().is_empty() {
            return Err(AppError::Inference {
                message: "Empty generation".to_string(),
                retryable: false,
            });
        }

        Ok(self.extractor.extract(&generated))
    }

    async fn attach_report(
        &self,
        analysis: &mut AiAnalysis,
        patient: &Patient,
        requester: &User,
        source: &UploadRecord,
    ) -> Result<()> {
        let result = analysis.result.as_ref().ok_or_else(|| AppError::Internal {
            message: "completed analysis without result".to_string(),
        })?;

        let bytes = self.renderer.render(&ReportContext {
            analysis: &*analysis,
            result,
            patient,
            requested_by: requester,
            source_file_name: &source.file_name,
            generated_at: Utc::now(),
        })?;

        let key = storage_key(patient.id, DocumentType::AiAnalysisReport, Some("pdf"));
        let size = bytes.len() as u64;
        let checksum = hex::encode(Sha256::digest(&bytes));
        self.objects.put_object(&key, "application/pdf", bytes).await?;

        let report = UploadRecord::analysis_report(
            patient.id,
            key,
            &format!("{}-report.pdf", analysis.analysis_id),
            size,
            checksum,
            requester.id,
        );
        self.store.insert_upload(&report).await?;

        let mut linked = analysis.clone();
        linked.attach_report(report.id)?;
        if !self
            .store
            .update_analysis_from(&linked, AnalysisStatus::Completed)
            .await?
        {
            return Err(AppError::Conflict {
                message: format!("analysis {} changed before its report was linked", analysis.analysis_id),
            });
        }
        *analysis = linked;

        info!(analysis_id = %analysis.analysis_id, report_id = %report.id, "Report attached");
        Ok(())
    }

    /// Pure read; the owning patient decides access
    pub async fn get_analysis(&self, requester: &User, analysis_id: &str) -> Result<AiAnalysis> {
        let analysis = self
            .store
            .find_analysis(analysis_id)
            .await?
            .ok_or_else(|| AppError::AnalysisNotFound {
                id: analysis_id.to_string(),
            })?;
        let patient = self.load_patient(analysis.patient_id).await?;
        authorize_patient(requester, &patient)?;
        Ok(analysis)
    }

    pub async fn list_for_patient(&self, requester: &User, patient_id: Uuid) -> Result<Vec<AiAnalysis>> {
        let patient = self.load_patient(patient_id).await?;
        authorize_patient(requester, &patient)?;
        self.store.list_analyses_for_patient(patient_id).await
    }

    /// Demote processing records older than the configured threshold to failed.
    ///
    /// Returns how many were demoted. A record that cannot be written is
    /// logged and left for the next sweep.
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let threshold = chrono::Duration::from_std(self.stale_after).map_err(|e| AppError::Configuration {
            message: format!("stale_after out of range: {}", e),
        })?;
        let cutoff = now - threshold;

        let stale = self.store.list_processing_started_before(cutoff).await?;
        let message = format!(
            "analysis abandoned: no terminal state within {}s",
            self.stale_after.as_secs()
        );

        let mut demoted = 0;
        for mut analysis in stale {
            if analysis.fail(&message, now).is_err() {
                continue;
            }
            match self
                .store
                .update_analysis_from(&analysis, AnalysisStatus::Processing)
                .await
            {
                Ok(true) => demoted += 1,
                Ok(false) => {}
                Err(e) => warn!(analysis_id = %analysis.analysis_id, error = %e, "Failed to demote stale analysis"),
            }
        }

        if demoted > 0 {
            info!(demoted, "Stale analyses demoted");
        }
        metrics::record_sweep(demoted);
        Ok(demoted)
    }

    async fn reload(&self, analysis_id: &str) -> Result<AiAnalysis> {
        self.store
            .find_analysis(analysis_id)
            .await?
            .ok_or_else(|| AppError::AnalysisNotFound {
                id: analysis_id.to_string(),
            })
    }

    async fn load_patient(&self, id: Uuid) -> Result<Patient> {
        self.store
            .find_patient(id)
            .await?
            .ok_or_else(|| AppError::PatientNotFound { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AnalysisStore, MemoryStore, PatientStore, UploadStore, UserStore};
    use crate::domain::{Demographics, Role};
    use crate::inference::{MockInference, MockReply};
    use crate::storage::MemoryObjectStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        objects: Arc<MemoryObjectStore>,
        service: AnalysisService,
        doctor: User,
        patient: Patient,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let inference = Arc::new(MockInference::new("Finding: normal. Recommend rest."));
        let service = AnalysisService::new(
            store.clone(),
            objects.clone(),
            inference,
            &AnalysisConfig::default(),
            Duration::from_secs(5),
        )
        .unwrap();

        let doctor = User::new("senior@clinic.test", "Senior", Role::SeniorDoctor, String::new());
        store.insert_user(&doctor).await.unwrap();
        let patient = Patient::new(Demographics::default(), doctor.id);
        store.insert_patient(&patient).await.unwrap();

        Fixture {
            store,
            objects,
            service,
            doctor,
            patient,
        }
    }

    #[tokio::test]
    async fn test_pending_upload_is_conflict() {
        let fx = fixture().await;
        let upload = UploadRecord::pending(fx.patient.id, "k1".into(), "a.txt", "text/plain", 3, fx.doctor.id);
        fx.store.insert_upload(&upload).await.unwrap();

        let err = fx.service.start_analysis(&fx.doctor, upload.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
        assert!(fx.store.list_analyses_for_patient(fx.patient.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_object_fails_analysis() {
        let fx = fixture().await;
        let mut upload = UploadRecord::pending(fx.patient.id, "k2".into(), "a.txt", "text/plain", 0, fx.doctor.id);
        upload.complete(Utc::now()).unwrap();
        fx.store.insert_upload(&upload).await.unwrap();
        fx.objects.put_object("k2", "text/plain", Vec::new()).await.unwrap();

        let analysis = fx.service.start_analysis(&fx.doctor, upload.id).await.unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Failed);
        assert!(analysis.error_message.unwrap().contains("empty"));
        assert!(analysis.pdf_report_id.is_none());
    }

    #[tokio::test]
    async fn test_sweep_demotes_only_stale() {
        let fx = fixture().await;
        let now = Utc::now();

        let mut stale = AiAnalysis::new(fx.patient.id, Uuid::new_v4(), fx.doctor.id, "m");
        stale.begin_processing(now - chrono::Duration::hours(1)).unwrap();
        fx.store.insert_analysis(&stale).await.unwrap();

        let mut fresh = AiAnalysis::new(fx.patient.id, Uuid::new_v4(), fx.doctor.id, "m");
        fresh.analysis_id.push_str("-fresh");
        fresh.begin_processing(now).unwrap();
        fx.store.insert_analysis(&fresh).await.unwrap();

        assert_eq!(fx.service.sweep_stale(now).await.unwrap(), 1);

        let swept = fx.store.find_analysis(&stale.analysis_id).await.unwrap().unwrap();
        assert_eq!(swept.status, AnalysisStatus::Failed);
        assert!(swept.error_message.unwrap().starts_with("analysis abandoned"));
        let untouched = fx.store.find_analysis(&fresh.analysis_id).await.unwrap().unwrap();
        assert_eq!(untouched.status, AnalysisStatus::Processing);

        assert_eq!(fx.service.sweep_stale(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_during_run_keeps_failed() {
        let fx = fixture().await;
        let inference = Arc::new(MockInference::with_script(
            "unused",
            vec![MockReply::Delay(Duration::from_millis(300), "Finding: normal.".to_string())],
        ));
        let service = AnalysisService::new(
            fx.store.clone(),
            fx.objects.clone(),
            inference,
            &AnalysisConfig::default(),
            Duration::from_secs(5),
        )
        .unwrap();

        let mut upload = UploadRecord::pending(fx.patient.id, "k3".into(), "cbc.txt", "text/plain", 11, fx.doctor.id);
        upload.complete(Utc::now()).unwrap();
        fx.store.insert_upload(&upload).await.unwrap();
        fx.objects.put_object("k3", "text/plain", b"blood panel".to_vec()).await.unwrap();

        let sweep = async {
            for _ in 0..50 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let demoted = service
                    .sweep_stale(Utc::now() + chrono::Duration::hours(1))
                    .await
                    .unwrap();
                if demoted > 0 {
                    return demoted;
                }
            }
            0
        };
        let (analysis, demoted) = tokio::join!(service.start_analysis(&fx.doctor, upload.id), sweep);
        assert_eq!(demoted, 1);

        let analysis = analysis.unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Failed);
        assert!(analysis.error_message.unwrap().starts_with("analysis abandoned"));
        assert!(analysis.pdf_report_id.is_none());

        let stored = fx.store.find_analysis(&analysis.analysis_id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Failed);
        assert!(stored.result.is_none());
        assert_eq!(fx.store.list_uploads_for_patient(fx.patient.id).await.unwrap().len(), 1);
    }
}
