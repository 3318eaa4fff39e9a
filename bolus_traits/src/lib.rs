pub mod profile;

pub use profile::{CARB_RATIO_RANGE, ISF_RANGE, LearningProfile, MealBucket, MealOutcomeRecord};

/// Persistence seam for the learning profile and scored meal outcomes.
///
/// The engine never touches physical storage; it calls these methods and
/// tolerates their failures. Implementations are expected to cap the number
/// of retained outcome records.
pub trait LearningStore {
    fn save(
        &mut self,
        profile: &LearningProfile,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn load(&mut self) -> Result<Option<LearningProfile>, Box<dyn std::error::Error + Send + Sync>>;
    fn save_outcome(
        &mut self,
        record: &MealOutcomeRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn load_outcomes(
        &mut self,
    ) -> Result<Vec<MealOutcomeRecord>, Box<dyn std::error::Error + Send + Sync>>;
    /// Forget the stored profile and every outcome record.
    fn clear(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: LearningStore + ?Sized> LearningStore for Box<T> {
    fn save(
        &mut self,
        profile: &LearningProfile,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).save(profile)
    }
    fn load(&mut self) -> Result<Option<LearningProfile>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).load()
    }
    fn save_outcome(
        &mut self,
        record: &MealOutcomeRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).save_outcome(record)
    }
    fn load_outcomes(
        &mut self,
    ) -> Result<Vec<MealOutcomeRecord>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).load_outcomes()
    }
    fn clear(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).clear()
    }
}
