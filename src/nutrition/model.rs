use serde::{Deserialize, Serialize};

/// Macros estimated for one meal photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutritionInfo {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

/// Sum of macros over a set of meals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MacroSummary {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl MacroSummary {
    pub fn total<'a, I>(meals: I) -> Self
    where
        I: IntoIterator<Item = &'a NutritionInfo>,
    {
        meals.into_iter().fold(Self::default(), |acc, n| Self {
            calories: acc.calories + n.calories,
            protein: acc.protein + n.protein,
            carbs: acc.carbs + n.carbs,
            fat: acc.fat + n.fat,
        })
    }
}

/// Daily macro goals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroTargets {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl Default for MacroTargets {
    fn default() -> Self {
        Self {
            calories: 2000.0,
            protein: 150.0,
            carbs: 200.0,
            fat: 50.0,
        }
    }
}

impl MacroTargets {
    pub fn validate(&self) -> Result<(), &'static str> {
        let fields = [self.calories, self.protein, self.carbs, self.fat];
        if fields.iter().all(|v| v.is_finite() && *v >= 0.0) {
            Ok(())
        } else {
            Err("targets must be non-negative numbers")
        }
    }

    /// Target minus consumed; negative once a goal is exceeded.
    pub fn remaining(&self, consumed: &MacroSummary) -> MacroSummary {
        MacroSummary {
            calories: self.calories - consumed.calories,
            protein: self.protein - consumed.protein,
            carbs: self.carbs - consumed.carbs,
            fat: self.fat - consumed.fat,
        }
    }
}
