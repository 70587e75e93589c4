//! Контекст запросов к открытому архиву: поиск строк по SID через индекс,
//! кэш декодированных строк и сканирование таблицы строк.

use carbon_error::{ArchiveError, CarbonResult};
use tracing::trace;

use super::{handle::Archive, strtab::StringEntry};
use crate::model::Sid;

/// Сведения о записи таблицы строк без её декодирования.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StridInfo {
    pub sid: Sid,
    /// Абсолютное смещение заголовка записи.
    pub offset: u64,
    /// Длина строки до упаковки.
    pub len: u32,
}

impl From<&StringEntry> for StridInfo {
    fn from(e: &StringEntry) -> Self {
        Self {
            sid: e.header.string_id,
            offset: e.offset,
            len: e.header.string_len,
        }
    }
}

/// Запросы к архиву. Дёшево создаётся через [`Archive::query`].
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    archive: &'a Archive,
}

impl<'a> Query<'a> {
    pub fn new(archive: &'a Archive) -> Self {
        Self { archive }
    }

    /// Смещение записи со строкой `sid`. Индекс строится при первом вызове,
    /// если он не был запечён в архив.
    pub fn find_offset(
        &self,
        sid: Sid,
    ) -> Option<u64> {
        self.archive.index().lookup(sid)
    }

    /// Строка по SID; `None`, если такого SID в таблице нет.
    pub fn fetch_string_by_id(
        &self,
        sid: Sid,
    ) -> CarbonResult<Option<String>> {
        if let Some(s) = self.archive.string_cache().lock().get(&sid) {
            trace!(sid, "string cache hit");
            return Ok(Some(s.clone()));
        }

        let Some(offset) = self.find_offset(sid) else {
            return Ok(None);
        };
        let (header, s) = self
            .archive
            .string_table()
            .decode_at(self.archive.data(), offset)?;
        if header.string_id != sid {
            return Err(ArchiveError::corrupted(format!(
                "index maps sid {sid} to an entry of sid {}",
                header.string_id
            ))
            .with_offset(offset)
            .into());
        }

        self.archive.string_cache().lock().put(sid, s.clone());
        Ok(Some(s))
    }

    /// Как [`Query::fetch_string_by_id`], но отсутствие SID — ошибка.
    pub fn fetch_string(
        &self,
        sid: Sid,
    ) -> CarbonResult<String> {
        self.fetch_string_by_id(sid)?
            .ok_or_else(|| ArchiveError::UnknownSid { sid }.into())
    }

    /// Декодирует записи по абсолютным смещениям их заголовков.
    pub fn fetch_strings_by_offsets(
        &self,
        offsets: &[u64],
    ) -> CarbonResult<Vec<String>> {
        let table = self.archive.string_table();
        offsets
            .iter()
            .map(|off| table.decode_at(self.archive.data(), *off).map(|(_, s)| s))
            .collect()
    }

    /// Перечисляет записи таблицы строк в порядке хранения.
    pub fn scan_strids(&self) -> impl Iterator<Item = StridInfo> + 'a {
        self.archive
            .string_table()
            .entries
            .iter()
            .map(StridInfo::from)
    }

    /// SID всех строк, удовлетворяющих предикату.
    pub fn find_ids<F>(
        &self,
        pred: F,
    ) -> CarbonResult<Vec<Sid>>
    where
        F: Fn(&str) -> bool,
    {
        let table = self.archive.string_table();
        let mut out = Vec::new();
        for entry in &table.entries {
            let s = table.decode(self.archive.data(), entry)?;
            if pred(&s) {
                out.push(entry.header.string_id);
            }
        }
        Ok(out)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use carbon_error::StatusCode;

    use super::*;
    use crate::{
        archive::builder::{archive_from_json, ArchiveOptions},
        model::{StringDict, SyncStringDict},
    };

    fn open(bake: bool) -> (Archive, SyncStringDict) {
        let mut dict = SyncStringDict::new();
        let options = ArchiveOptions {
            bake_index: bake,
            ..ArchiveOptions::default()
        };
        let out = archive_from_json(
            r#"{"city": "Oslo", "tags": ["north", "cold"]}"#,
            &mut dict,
            &options,
        )
        .unwrap();
        (Archive::from_stream(out.into_inner()).unwrap(), dict)
    }

    #[test]
    fn test_fetch_by_id_with_and_without_index() {
        for bake in [false, true] {
            let (archive, dict) = open(bake);
            let query = archive.query();
            let sid = dict.locate(&["Oslo"])[0].unwrap();
            assert_eq!(query.fetch_string_by_id(sid).unwrap().as_deref(), Some("Oslo"));
            // Повторный запрос обслуживается кэшем.
            assert_eq!(query.fetch_string_by_id(sid).unwrap().as_deref(), Some("Oslo"));
            assert_eq!(query.fetch_string_by_id(999).unwrap(), None);
        }
    }

    #[test]
    fn test_fetch_unknown_sid_is_error() {
        let (archive, _) = open(false);
        let err = archive.query().fetch_string(999).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NotFound);
    }

    #[test]
    fn test_scan_and_fetch_by_offsets() {
        let (archive, dict) = open(true);
        let query = archive.query();
        let infos: Vec<StridInfo> = query.scan_strids().collect();
        assert_eq!(infos.len(), dict.num_distinct());

        let offsets: Vec<u64> = infos.iter().map(|i| i.offset).collect();
        let strings = query.fetch_strings_by_offsets(&offsets).unwrap();
        let (expected, _) = dict.contents();
        assert_eq!(strings, expected);
        for (info, s) in infos.iter().zip(&strings) {
            assert_eq!(info.len as usize, s.len());
            assert_eq!(query.find_offset(info.sid), Some(info.offset));
        }
    }

    #[test]
    fn test_find_ids() {
        let (archive, dict) = open(false);
        let ids = archive.query().find_ids(|s| s.contains('o')).unwrap();
        let names = dict.extract(&ids);
        let mut names: Vec<String> = names.into_iter().flatten().collect();
        names.sort();
        assert_eq!(names, vec!["Oslo", "cold", "north"]);
    }
}
