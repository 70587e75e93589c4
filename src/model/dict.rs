use rustc_hash::FxHashMap;

use super::{Sid, NULL_SID};

/// Словарь интернированных строк.
///
/// Архив не видит, как назначаются идентификаторы: ему нужны только
/// содержимое словаря (для таблицы строк) и обратное преобразование SID →
/// строка (для сортировки ключей).
pub trait StringDict {
    /// Интернирует строки, возвращая SID для каждой (повторы получают уже
    /// выданный SID).
    fn insert(
        &mut self,
        strings: &[&str],
    ) -> Vec<Sid>;

    /// Ищет SID без вставки.
    fn locate(
        &self,
        strings: &[&str],
    ) -> Vec<Option<Sid>>;

    /// Обратное преобразование SID → строка.
    fn extract(
        &self,
        sids: &[Sid],
    ) -> Vec<Option<String>>;

    /// Все строки словаря и их SID, упорядоченные по SID.
    fn contents(&self) -> (Vec<String>, Vec<Sid>);

    fn num_distinct(&self) -> usize;

    /// Интернирует одну строку.
    fn intern(
        &mut self,
        s: &str,
    ) -> Sid {
        self.insert(&[s]).first().copied().unwrap_or(NULL_SID)
    }
}

/// Однопоточный словарь: SID выдаются подряд начиная с 1.
#[derive(Debug, Default, Clone)]
pub struct SyncStringDict {
    by_string: FxHashMap<String, Sid>,
    by_sid: Vec<String>,
}

impl SyncStringDict {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StringDict for SyncStringDict {
    fn insert(
        &mut self,
        strings: &[&str],
    ) -> Vec<Sid> {
        strings
            .iter()
            .map(|s| {
                if let Some(sid) = self.by_string.get(*s) {
                    return *sid;
                }
                self.by_sid.push(s.to_string());
                let sid = self.by_sid.len() as Sid;
                self.by_string.insert(s.to_string(), sid);
                sid
            })
            .collect()
    }

    fn locate(
        &self,
        strings: &[&str],
    ) -> Vec<Option<Sid>> {
        strings
            .iter()
            .map(|s| self.by_string.get(*s).copied())
            .collect()
    }

    fn extract(
        &self,
        sids: &[Sid],
    ) -> Vec<Option<String>> {
        sids.iter()
            .map(|&sid| {
                if sid == NULL_SID {
                    return None;
                }
                self.by_sid.get(sid as usize - 1).cloned()
            })
            .collect()
    }

    fn contents(&self) -> (Vec<String>, Vec<Sid>) {
        let sids = (1..=self.by_sid.len() as Sid).collect();
        (self.by_sid.clone(), sids)
    }

    fn num_distinct(&self) -> usize {
        self.by_sid.len()
    }
}
