use std::sync::Arc;

use lprgate_core::api::types::{FinalResponse, RecognitionData};
use lprgate_core::storage::{now_ts, NewPlateLog};
use tokio_util::sync::CancellationToken;

use super::{
    with_cancel, ArchivalUploader, DispatchError, ErrorKind, MembershipLookup, PlateLogStore, RecognitionJob,
    Recognizer, RequestMetadata,
};

/// One recognition run end to end: recognize, archive, persist, reconcile.
pub struct RecognitionOrchestrator {
    recognizer: Arc<dyn Recognizer>,
    archiver: ArchivalUploader,
    store: Arc<dyn PlateLogStore>,
    membership: Option<Arc<dyn MembershipLookup>>,
}

impl RecognitionOrchestrator {
    pub fn new(recognizer: Arc<dyn Recognizer>, archiver: ArchivalUploader, store: Arc<dyn PlateLogStore>) -> Self {
        Self {
            recognizer,
            archiver,
            store,
            membership: None,
        }
    }

    pub fn with_membership(mut self, membership: Arc<dyn MembershipLookup>) -> Self {
        self.membership = Some(membership);
        self
    }

    pub async fn process(
        &self,
        token: &str,
        job: &RecognitionJob,
        cancel: &CancellationToken,
    ) -> Result<FinalResponse, DispatchError> {
        let mut request_metrics = crate::metrics::begin_recognize_request();

        // 中文注释：识别失败（含无车牌）直接返回，此时不能落任何记录，日志表只保存成功识别。
        let recognized = match self
            .recognizer
            .recognize(token, &job.image_path, &job.mmc, &job.camera_id, cancel)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                match err.kind() {
                    ErrorKind::NoPlateDetected => {
                        crate::metrics::record_no_plate();
                        log::info!("recognition found no plate: camera_id={}", job.camera_id);
                    }
                    ErrorKind::Cancelled => {
                        log::info!("recognition cancelled: camera_id={}", job.camera_id);
                    }
                    _ => log::error!(
                        "recognition failed: camera_id={}, location_code={}, err={}",
                        job.camera_id,
                        job.location_code,
                        err
                    ),
                }
                return Err(err);
            }
        };
        let plate = recognized.plate.to_uppercase();

        let status_member = match &self.membership {
            Some(lookup) => Some(with_cancel(cancel, lookup.category(&plate)).await?),
            None => None,
        };
        let final_response = FinalResponse::recognized(RecognitionData {
            plate: plate.clone(),
            score: recognized.score,
            status_member,
        });

        let mut metadata = RequestMetadata::from_job(job);
        if let Some(url) = self.archiver.archive(&job.image_path, &job.camera_id, cancel).await {
            metadata.set_image_url(url);
        }
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let response_final = serde_json::to_string(&final_response)
            .map_err(|err| DispatchError::Persistence(format!("encode response failed: {err}")))?;
        let now = now_ts();
        let record = NewPlateLog {
            location_code: job.location_code.clone(),
            camera_id: job.camera_id.clone(),
            transaction_no: job.transaction_no.clone(),
            plate: plate.clone(),
            accuracy: format!("{:.2}", recognized.score),
            captured_at: now,
            request_data: metadata.to_json(),
            response_data: String::new(),
            response_final,
            image_url: metadata.image_url().unwrap_or_default().to_string(),
            created_at: now,
        };
        let id = self.store.create_record(&record).await.map_err(|err| {
            log::error!(
                "plate log create failed: camera_id={}, plate={}, err={}",
                job.camera_id,
                plate,
                err
            );
            DispatchError::Persistence(err)
        })?;

        // Runs even if the caller went away: the record already exists.
        if let Err(err) = self.store.update_request_data(id, &metadata.to_json()).await {
            crate::metrics::record_reconcile_failure();
            log::warn!("plate log reconcile failed: id={id}, err={err}");
        }

        log::info!(
            "recognition completed: id={}, camera_id={}, plate={}, score={:.2}",
            id,
            job.camera_id,
            plate,
            recognized.score
        );
        request_metrics.mark_success();
        Ok(final_response)
    }
}
