//! 候选解析：类型过滤、限定符过滤、条件过滤，以及单个候选的选择规则

use std::sync::Arc;

use crate::bean::{BeanDefinition, TypeKey};
use crate::condition::ConditionEvaluator;
use crate::config::Environment;
use crate::error::{ContainerError, ContainerResult};
use crate::qualifier::Qualifier;
use crate::registry::BeanDefinitionRegistry;

/// 候选解析器
pub struct CandidateResolver<'a> {
    registry: &'a BeanDefinitionRegistry,
    environment: &'a Environment,
}

impl<'a> CandidateResolver<'a> {
    pub fn new(registry: &'a BeanDefinitionRegistry, environment: &'a Environment) -> Self {
        Self {
            registry,
            environment,
        }
    }

    /// 所有有效候选，按 order 升序排列，相同 order 保持注册顺序
    pub fn find_candidates(
        &self,
        key: TypeKey,
        qualifier: Option<&Qualifier>,
    ) -> Vec<Arc<BeanDefinition>> {
        let evaluator = ConditionEvaluator::new(self.registry, self.environment);
        let mut candidates: Vec<Arc<BeanDefinition>> = self
            .registry
            .candidates(key)
            .into_iter()
            .filter(|definition| qualifier.map_or(true, |q| q.matches(definition, key)))
            .filter(|definition| evaluator.is_eligible(definition))
            .collect();

        candidates.sort_by_key(|definition| definition.order());
        tracing::trace!(
            "Resolved {} candidate(s) for type '{}'{}",
            candidates.len(),
            key,
            qualifier.map(|q| format!(" with qualifier {}", q)).unwrap_or_default()
        );
        candidates
    }

    /// 解析单个候选
    ///
    /// 没有候选时返回 `Ok(None)`；多个候选时依次按 primary、最小 order 选择，
    /// 仍然无法区分时返回 `NonUniqueBean`。
    pub fn resolve_unique(
        &self,
        key: TypeKey,
        qualifier: Option<&Qualifier>,
    ) -> ContainerResult<Option<Arc<BeanDefinition>>> {
        let candidates = self.find_candidates(key, qualifier);
        select_unique(key, candidates)
    }
}

fn select_unique(
    key: TypeKey,
    mut candidates: Vec<Arc<BeanDefinition>>,
) -> ContainerResult<Option<Arc<BeanDefinition>>> {
    if candidates.len() <= 1 {
        return Ok(candidates.pop());
    }

    let primaries: Vec<Arc<BeanDefinition>> = candidates
        .iter()
        .filter(|d| d.is_primary())
        .cloned()
        .collect();

    let pool = match primaries.len() {
        1 => return Ok(primaries.into_iter().next()),
        0 => candidates,
        _ => primaries,
    };

    // pool 已按 order 排序
    let lowest = pool[0].order();
    let tied: Vec<&Arc<BeanDefinition>> = pool.iter().filter(|d| d.order() == lowest).collect();
    if tied.len() == 1 {
        return Ok(Some(Arc::clone(tied[0])));
    }

    Err(ContainerError::NonUniqueBean {
        bean_type: key.short_name(),
        candidates: tied.iter().map(|d| d.name().to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::registry::BeanDefinitionRegistryBuilder;

    trait Engine: Send + Sync {}

    struct V6Engine;
    struct V8Engine;
    struct V12Engine;

    impl Engine for V6Engine {}
    impl Engine for V8Engine {}
    impl Engine for V12Engine {}

    fn engine<T: Engine + 'static>(factory: fn() -> T) -> crate::bean::BeanDefinitionBuilder<T> {
        BeanDefinition::builder(move |_| Ok(factory()))
            .exposes::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
    }

    fn resolve(definitions: Vec<BeanDefinition>) -> ContainerResult<Option<String>> {
        let mut builder = BeanDefinitionRegistryBuilder::new();
        for definition in definitions {
            builder.register(definition);
        }
        let registry = builder.build()?;
        let env = Environment::new();
        let resolver = CandidateResolver::new(&registry, &env);
        Ok(resolver
            .resolve_unique(TypeKey::of::<dyn Engine>(), None)?
            .map(|d| d.name().to_string()))
    }

    #[test]
    fn test_primary_wins_regardless_of_registration_order() {
        let forward = resolve(vec![engine(|| V6Engine).build(), engine(|| V8Engine).primary().build()]);
        let backward = resolve(vec![engine(|| V8Engine).primary().build(), engine(|| V6Engine).build()]);

        assert_eq!(forward.unwrap(), Some("v8Engine".to_string()));
        assert_eq!(backward.unwrap(), Some("v8Engine".to_string()));
    }

    #[test]
    fn test_lowest_order_wins() {
        let result = resolve(vec![
            engine(|| V6Engine).order(10).build(),
            engine(|| V8Engine).order(-5).build(),
        ]);
        assert_eq!(result.unwrap(), Some("v8Engine".to_string()));
    }

    #[test]
    fn test_lowest_order_among_primaries() {
        let result = resolve(vec![
            engine(|| V6Engine).primary().order(3).build(),
            engine(|| V8Engine).primary().order(1).build(),
            engine(|| V12Engine).order(0).build(),
        ]);
        assert_eq!(result.unwrap(), Some("v8Engine".to_string()));
    }

    #[test]
    fn test_ambiguous_candidates() {
        let result = resolve(vec![engine(|| V6Engine).build(), engine(|| V8Engine).build()]);

        match result {
            Err(ContainerError::NonUniqueBean { candidates, .. }) => {
                assert_eq!(candidates, vec!["v6Engine", "v8Engine"]);
            }
            other => panic!("Expected NonUniqueBean, got {:?}", other),
        }
    }

    #[test]
    fn test_no_candidates_and_condition_filtering() {
        assert_eq!(resolve(vec![]).unwrap(), None);

        let result = resolve(vec![
            engine(|| V6Engine).build(),
            engine(|| V8Engine)
                .condition(Condition::property_equals("engine.kind", "v8"))
                .build(),
        ]);
        assert_eq!(result.unwrap(), Some("v6Engine".to_string()));
    }

    #[test]
    fn test_collection_order_is_stable() {
        let mut builder = BeanDefinitionRegistryBuilder::new();
        builder
            .register(engine(|| V12Engine).order(5).build())
            .register(engine(|| V6Engine).build())
            .register(engine(|| V8Engine).build());
        let registry = builder.build().unwrap();
        let env = Environment::new();

        let names: Vec<String> = CandidateResolver::new(&registry, &env)
            .find_candidates(TypeKey::of::<dyn Engine>(), None)
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["v6Engine", "v8Engine", "v12Engine"]);
    }

    #[test]
    fn test_qualifier_filters_candidates() {
        let mut builder = BeanDefinitionRegistryBuilder::new();
        builder
            .register(engine(|| V6Engine).build())
            .register(engine(|| V8Engine).build());
        let registry = builder.build().unwrap();
        let env = Environment::new();
        let resolver = CandidateResolver::new(&registry, &env);

        let found = resolver
            .resolve_unique(TypeKey::of::<dyn Engine>(), Some(&Qualifier::named("v6Engine")))
            .unwrap();
        assert_eq!(found.map(|d| d.name().to_string()), Some("v6Engine".to_string()));
    }
}
