use carbon_error::{bail, CarbonResult, StatusCode};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::model::Oid;

/// Источник идентификаторов объектов, подставляемый в сериализатор.
pub trait OidGenerator {
    fn next_oid(&mut self) -> CarbonResult<Oid>;
}

/// Случайные 64-битные OID.
#[derive(Debug, Clone)]
pub struct RandomOids {
    rng: StdRng,
}

impl RandomOids {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Детерминированная последовательность (тесты, воспроизводимые сборки).
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomOids {
    fn default() -> Self {
        Self::new()
    }
}

impl OidGenerator for RandomOids {
    fn next_oid(&mut self) -> CarbonResult<Oid> {
        Ok(self.rng.gen())
    }
}

/// Монотонный счётчик. Выдаёт все значения от `start` до `u64::MAX`
/// включительно.
#[derive(Debug, Clone)]
pub struct SequentialOids {
    /// `None` — пространство исчерпано.
    next: Option<Oid>,
}

impl SequentialOids {
    pub fn new(start: Oid) -> Self {
        Self { next: Some(start) }
    }
}

impl Default for SequentialOids {
    fn default() -> Self {
        Self::new(1)
    }
}

impl OidGenerator for SequentialOids {
    fn next_oid(&mut self) -> CarbonResult<Oid> {
        let Some(oid) = self.next else {
            bail!(StatusCode::SizeLimit, "object id space exhausted");
        };
        self.next = oid.checked_add(1);
        Ok(oid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_oids() {
        let mut g = SequentialOids::new(5);
        assert_eq!(g.next_oid().unwrap(), 5);
        assert_eq!(g.next_oid().unwrap(), 6);

    }

    /// Тест проверяет, что `u64::MAX` выдаётся, а ошибка возникает только
    /// на следующем вызове.
    #[test]
    fn test_sequential_oids_issue_last_value() {
        let mut g = SequentialOids::new(u64::MAX - 1);
        assert_eq!(g.next_oid().unwrap(), u64::MAX - 1);
        assert_eq!(g.next_oid().unwrap(), u64::MAX);

        let err = g.next_oid().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SizeLimit);
        assert!(g.next_oid().is_err());
    }

    #[test]
    fn test_seeded_random_oids_are_reproducible() {
        let mut a = RandomOids::seeded(42);
        let mut b = RandomOids::seeded(42);
        for _ in 0..8 {
            assert_eq!(a.next_oid().unwrap(), b.next_oid().unwrap());
        }
    }
}
