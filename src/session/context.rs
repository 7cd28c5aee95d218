//! Clinical context questionnaire: a fixed ordered list of questions
//! asked after the document is read. The pregnancy question is asked
//! only when the answer to the sex question is female.

use serde::{Deserialize, Serialize};

/// Вопрос анкеты клинического контекста.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextField {
    Age,
    Sex,
    Symptoms,
    ChronicConditions,
    Medications,
    Pregnancy,
}

/// Собранные ответы анкеты.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextAnswers {
    pub age: Option<u8>,
    pub sex: Option<String>,
    pub symptoms: Option<String>,
    pub chronic_conditions: Option<String>,
    pub medications: Option<String>,
    pub pregnancy: Option<String>,
}

impl ContextAnswers {
    /// Считается ли пользователь женщиной для вопроса о беременности
    fn is_female(&self) -> bool {
        self.sex.as_deref().map(|s| s == "женский").unwrap_or(false)
    }

    /// Следующий незаполненный вопрос в фиксированном порядке
    pub fn next_field(&self) -> Option<ContextField> {
        if self.age.is_none() {
            return Some(ContextField::Age);
        }
        if self.sex.is_none() {
            return Some(ContextField::Sex);
        }
        if self.symptoms.is_none() {
            return Some(ContextField::Symptoms);
        }
        if self.chronic_conditions.is_none() {
            return Some(ContextField::ChronicConditions);
        }
        if self.medications.is_none() {
            return Some(ContextField::Medications);
        }
        if self.is_female() && self.pregnancy.is_none() {
            return Some(ContextField::Pregnancy);
        }
        None
    }

    /// Порядковый номер текущего вопроса (для AwaitingContext(i))
    pub fn next_index(&self) -> usize {
        [
            self.age.is_some(),
            self.sex.is_some(),
            self.symptoms.is_some(),
            self.chronic_conditions.is_some(),
            self.medications.is_some(),
        ]
        .iter()
        .filter(|filled| **filled)
        .count()
    }

    /// Валидирует ответ и записывает его в анкету.
    ///
    /// Возвращает текст ошибки для повторного вопроса, если ответ
    /// не прошёл валидацию; анкета при этом не меняется.
    pub fn apply_answer(&mut self, field: ContextField, input: &str) -> Result<(), &'static str> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("Ответ не может быть пустым. Попробуйте ещё раз.");
        }

        match field {
            ContextField::Age => {
                let age: u8 = trimmed
                    .parse()
                    .map_err(|_| "Укажите возраст числом, например: 34")?;
                if !(1..=120).contains(&age) {
                    return Err("Возраст должен быть от 1 до 120 лет.");
                }
                self.age = Some(age);
            }
            ContextField::Sex => {
                let lower = trimmed.to_lowercase();
                let sex = if lower.starts_with('ж') || lower.starts_with('f') {
                    "женский"
                } else if lower.starts_with('м') || lower.starts_with('m') {
                    "мужской"
                } else {
                    return Err("Укажите пол: мужской или женский.");
                };
                self.sex = Some(sex.to_string());
            }
            ContextField::Symptoms => self.symptoms = Some(trimmed.to_string()),
            ContextField::ChronicConditions => self.chronic_conditions = Some(trimmed.to_string()),
            ContextField::Medications => self.medications = Some(trimmed.to_string()),
            ContextField::Pregnancy => self.pregnancy = Some(trimmed.to_string()),
        }
        Ok(())
    }

    /// Сводка контекста для промпта LLM
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(age) = self.age {
            parts.push(format!("Возраст: {}", age));
        }
        if let Some(ref sex) = self.sex {
            parts.push(format!("Пол: {}", sex));
        }
        if let Some(ref s) = self.symptoms {
            parts.push(format!("Жалобы: {}", s));
        }
        if let Some(ref c) = self.chronic_conditions {
            parts.push(format!("Хронические заболевания: {}", c));
        }
        if let Some(ref m) = self.medications {
            parts.push(format!("Принимаемые препараты: {}", m));
        }
        if let Some(ref p) = self.pregnancy {
            parts.push(format!("Беременность: {}", p));
        }
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_question_order_for_male() {
        let mut answers = ContextAnswers::default();
        assert_eq!(answers.next_field(), Some(ContextField::Age));
        answers.apply_answer(ContextField::Age, "40").unwrap();
        assert_eq!(answers.next_field(), Some(ContextField::Sex));
        answers.apply_answer(ContextField::Sex, "м").unwrap();
        answers.apply_answer(ContextField::Symptoms, "усталость").unwrap();
        answers.apply_answer(ContextField::ChronicConditions, "нет").unwrap();
        answers.apply_answer(ContextField::Medications, "нет").unwrap();

        // No pregnancy question for male users
        assert_eq!(answers.next_field(), None);
    }

    #[test]
    fn test_pregnancy_asked_only_for_female() {
        let mut answers = ContextAnswers::default();
        answers.apply_answer(ContextField::Age, "29").unwrap();
        answers.apply_answer(ContextField::Sex, "Женский").unwrap();
        answers.apply_answer(ContextField::Symptoms, "головные боли").unwrap();
        answers.apply_answer(ContextField::ChronicConditions, "нет").unwrap();
        answers.apply_answer(ContextField::Medications, "нет").unwrap();

        assert_eq!(answers.next_field(), Some(ContextField::Pregnancy));
        answers.apply_answer(ContextField::Pregnancy, "нет").unwrap();
        assert_eq!(answers.next_field(), None);
    }

    #[test]
    fn test_age_validation() {
        let mut answers = ContextAnswers::default();
        assert!(answers.apply_answer(ContextField::Age, "abc").is_err());
        assert!(answers.apply_answer(ContextField::Age, "0").is_err());
        assert!(answers.apply_answer(ContextField::Age, "121").is_err());
        assert!(answers.age.is_none());
        assert!(answers.apply_answer(ContextField::Age, " 34 ").is_ok());
        assert_eq!(answers.age, Some(34));
    }

    #[test]
    fn test_empty_answer_rejected() {
        let mut answers = ContextAnswers::default();
        answers.apply_answer(ContextField::Age, "34").unwrap();
        answers.apply_answer(ContextField::Sex, "ж").unwrap();
        assert!(answers.apply_answer(ContextField::Symptoms, "   ").is_err());
        assert_eq!(answers.next_field(), Some(ContextField::Symptoms));
    }

    #[test]
    fn test_summary_includes_collected_fields() {
        let mut answers = ContextAnswers::default();
        answers.apply_answer(ContextField::Age, "34").unwrap();
        answers.apply_answer(ContextField::Sex, "ж").unwrap();
        let summary = answers.summary();
        assert!(summary.contains("Возраст: 34"));
        assert!(summary.contains("Пол: женский"));
        assert!(!summary.contains("Жалобы"));
    }
}
