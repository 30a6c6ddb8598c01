//! 规则求值性能基准测试
//!
//! 覆盖值比较、规则集编译和不同元组策略下的执行耗时。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rule_engine::evaluator::{compare, values_equal};
use rule_engine::{
    Action, ActionContext, Arguments, EngineConfig, ExecutionContext, Expression, Fact,
    InMemoryRuleRepository, Parameter, Rule, RuleCompiler, RuleEngine,
};
use serde_json::{Value, json};
use std::hint::black_box;
use std::sync::Arc;

fn count(_args: &Arguments, ctx: &mut ActionContext<'_>) -> rule_engine::Result<()> {
    let result = ctx.result();
    let current = result.get("count").and_then(Value::as_u64).unwrap_or(0);
    result["count"] = json!(current + 1);
    Ok(())
}

fn airline_rules(n: usize) -> Vec<Rule> {
    (0..n)
        .map(|i| {
            Rule::new(
                format!("rule-{}", i),
                Expression::and(vec![
                    Expression::equal(
                        Expression::field("airline", "name"),
                        Expression::constant("Lufthansa"),
                    ),
                    Expression::op(
                        "greater",
                        vec![
                            Expression::field("airline", "fleet"),
                            Expression::constant(i as i64),
                        ],
                    ),
                ]),
            )
            .with_priority(i as i64)
            .with_fact("airline", "Airline")
            .with_action(Action::new(
                "count",
                vec![Parameter::new("name", Expression::placeholder("airline.name"))],
            ))
        })
        .collect()
}

fn airline_facts(n: usize) -> Vec<Fact> {
    (0..n)
        .map(|i| {
            let name = if i % 2 == 0 { "Lufthansa" } else { "American" };
            Fact::new("Airline", json!({"name": name, "fleet": i}))
        })
        .collect()
}

fn engine(rules: Vec<Rule>, config: EngineConfig) -> RuleEngine {
    RuleEngine::builder()
        .config(config)
        .repository(Arc::new(InMemoryRuleRepository::new().with_ruleset("bench", rules)))
        .action_fn("count", count)
        .build()
        .expect("engine")
}

/// 值比较基准
fn bench_value_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_comparison");

    let (int_a, int_b) = (json!(1000), json!(500));
    let (float_a, float_b) = (json!(1000.5), json!(1000));
    let (date_a, date_b) = (json!("2024-01-15T10:00:00Z"), json!("2024-01-16"));
    let (list_a, list_b) = (json!(["a", "b", "c"]), json!(["a", "b", "c"]));

    group.bench_function("compare_int", |b| {
        b.iter(|| compare(black_box(&int_a), black_box(&int_b)))
    });
    group.bench_function("compare_mixed_numeric", |b| {
        b.iter(|| compare(black_box(&float_a), black_box(&float_b)))
    });
    group.bench_function("compare_datetime_strings", |b| {
        b.iter(|| compare(black_box(&date_a), black_box(&date_b)))
    });
    group.bench_function("equal_lists", |b| {
        b.iter(|| values_equal(black_box(&list_a), black_box(&list_b)))
    });

    group.finish();
}

/// 规则集编译基准
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_ruleset");
    let compiler = RuleCompiler::default();

    for size in [10, 100] {
        let rules = airline_rules(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &rules, |b, rules| {
            b.iter(|| compiler.compile_ruleset(black_box(rules.clone())))
        });
    }

    group.finish();
}

/// 单事实名轮询执行基准
fn bench_execute_round_robin(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_round_robin");

    for (rules, facts) in [(10, 100), (10, 1000), (100, 100)] {
        let engine = engine(airline_rules(rules), EngineConfig::default());
        let facts = airline_facts(facts);
        group.bench_with_input(
            BenchmarkId::new(format!("rules_{}", rules), facts.len()),
            &facts,
            |b, facts| {
                b.iter(|| {
                    engine.execute(black_box(
                        ExecutionContext::new("bench").with_facts(facts.iter().cloned()),
                    ))
                })
            },
        );
    }

    group.finish();
}

/// 笛卡尔积执行基准
fn bench_execute_cross_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_cross_product");

    let rule = Rule::new(
        "pair",
        Expression::op(
            "less",
            vec![
                Expression::field("flight", "price"),
                Expression::field("hotel", "price"),
            ],
        ),
    )
    .with_fact("flight", "Flight")
    .with_fact("hotel", "Hotel")
    .with_action(Action::new("count", vec![]));
    let config = EngineConfig {
        cross_product_mode: true,
        ..Default::default()
    };
    let engine = engine(vec![rule], config);

    for size in [10, 50] {
        let facts: Vec<Fact> = (0..size)
            .flat_map(|i| {
                [
                    Fact::new("Flight", json!({"price": i * 10})),
                    Fact::new("Hotel", json!({"price": i * 7})),
                ]
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &facts, |b, facts| {
            b.iter(|| {
                engine.execute(black_box(
                    ExecutionContext::new("bench").with_facts(facts.iter().cloned()),
                ))
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_value_comparison,
    bench_compile,
    bench_execute_round_robin,
    bench_execute_cross_product,
);

criterion_main!(benches);
