//! Script evaluator
//!
//! Names resolve in this order: `let` variables, route vocabulary (inside a
//! route block only), builtins, then capabilities registered in the session.

use std::collections::HashMap;
use std::sync::Arc;

use routeplane_sdk::ProcessorRef;
use serde_json::Value as JsonValue;

use super::ast::{Arg, Expr, Literal, Pos, Script, Stmt};
use super::{BUILTINS, MAX_NESTING, VOCABULARY};
use crate::config::Configuration;
use crate::control::route_config::RouteConfigProcessor;
use crate::engine::registry::ComponentRegistry;
use crate::topology::builder::RouteDefinitionBuilder;
use crate::topology::capability::{Args, CapabilityRegistry, Origin, TypeCatalog};
use crate::topology::configurator::RouteConfigurator;
use crate::topology::definition::{DefinitionBuilder, RouteDefinition};
use crate::topology::error::TopologyError;
use crate::topology::predicate::{Operand, Predicate};
use crate::topology::value::{Symbol, Value};

/// The body of a `route { }` block together with the variables in scope
/// where it was written.
#[derive(Debug, Clone)]
pub struct RouteBlock {
    pub body: Arc<Vec<Stmt>>,
    pub captured: HashMap<String, Value>,
    pub pos: Pos,
}

/// Evaluates scripts against one topology session.
pub struct Evaluator<'a> {
    capabilities: &'a mut CapabilityRegistry,
    types: &'a TypeCatalog,
    config: &'a Configuration,
    components: &'a dyn ComponentRegistry,
    configurator: &'a RouteConfigurator,
    vars: HashMap<String, Value>,
    builder: Option<DefinitionBuilder>,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        capabilities: &'a mut CapabilityRegistry,
        types: &'a TypeCatalog,
        config: &'a Configuration,
        components: &'a dyn ComponentRegistry,
        configurator: &'a RouteConfigurator,
    ) -> Self {
        Self {
            capabilities,
            types,
            config,
            components,
            configurator,
            vars: HashMap::new(),
            builder: None,
            depth: 0,
        }
    }

    /// Evaluate top-level statements and return the script's route block.
    ///
    /// A script must contain exactly one top-level `route` block. The block
    /// itself is not evaluated here.
    pub fn run_script(&mut self, script: &Script) -> Result<RouteBlock, TopologyError> {
        match script.route_blocks() {
            0 => return Err(TopologyError::NoRouteBlock),
            1 => {}
            count => return Err(TopologyError::MultipleRoutes { count }),
        }
        reject_nested_routes(&script.stmts)?;

        let mut block = None;
        for stmt in &script.stmts {
            match stmt {
                Stmt::Let { name, value, .. } => {
                    let value = self.eval(value)?;
                    self.vars.insert(name.clone(), value);
                }
                Stmt::Route { body, pos } => {
                    block = Some(RouteBlock {
                        body: Arc::new(body.clone()),
                        captured: self.vars.clone(),
                        pos: *pos,
                    });
                }
                Stmt::Expr(expr) => {
                    self.eval(expr)?;
                }
            }
        }
        block.ok_or(TopologyError::NoRouteBlock)
    }

    /// Evaluate a route block into a definition.
    pub fn run_block(&mut self, block: &RouteBlock) -> Result<RouteDefinition, TopologyError> {
        self.vars = block.captured.clone();
        self.builder = Some(DefinitionBuilder::new());

        for stmt in block.body.iter() {
            match stmt {
                Stmt::Let { name, value, .. } => {
                    let value = self.eval(value)?;
                    self.vars.insert(name.clone(), value);
                }
                Stmt::Route { .. } => {
                    return Err(TopologyError::MisplacedStep(
                        "route block nested inside a route block".to_string(),
                    ))
                }
                Stmt::Expr(expr) => {
                    self.eval(expr)?;
                }
            }
        }

        self.builder
            .take()
            .ok_or_else(|| TopologyError::MisplacedStep("route block closed twice".to_string()))?
            .build()
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, TopologyError> {
        if self.depth >= MAX_NESTING {
            return Err(TopologyError::NestingTooDeep { limit: MAX_NESTING });
        }
        self.depth += 1;
        let value = self.eval_expr(expr);
        self.depth -= 1;
        value
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, TopologyError> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Nil => Value::Nil,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(s.clone()),
                Literal::Symbol(s) => Value::Symbol(Symbol::new(s.clone())),
            }),
            Expr::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    out.push((k.clone(), self.eval(v)?));
                }
                Ok(Value::Map(out))
            }
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Call { name, args, pos } => self.call(name, args.as_deref(), *pos),
            Expr::Method {
                receiver,
                name,
                args,
                ..
            } => {
                let receiver = self.eval(receiver)?;
                let args = self.eval_args(args.as_deref())?;
                self.method(receiver, name, args)
            }
        }
    }

    fn eval_args(&mut self, args: Option<&[Arg]>) -> Result<Args, TopologyError> {
        let mut out = Args::new();
        for arg in args.unwrap_or_default() {
            match arg {
                Arg::Positional(expr) => out.positional.push(self.eval(expr)?),
                Arg::Named(name, expr) => {
                    let value = self.eval(expr)?;
                    out.named.push((name.clone(), value));
                }
            }
        }
        Ok(out)
    }

    fn call(&mut self, name: &str, args: Option<&[Arg]>, pos: Pos) -> Result<Value, TopologyError> {
        if args.is_none() {
            if let Some(value) = self.vars.get(name) {
                return Ok(value.clone());
            }
        }

        let evaluated = self.eval_args(args)?;
        if VOCABULARY.contains(&name) {
            return self.vocabulary(name, evaluated);
        }
        if BUILTINS.contains(&name) {
            return self.builtin(name, evaluated);
        }
        if let Some(capability) = self.capabilities.get(name) {
            tracing::trace!(capability = name, line = pos.line, "Invoking capability");
            return Ok(capability.invoke(&evaluated, self.components)?);
        }
        Err(TopologyError::UnknownName(name.to_string()))
    }

    fn method(&mut self, receiver: Value, name: &str, args: Args) -> Result<Value, TopologyError> {
        match receiver {
            Value::Builder if VOCABULARY.contains(&name) => self.vocabulary(name, args),
            Value::Operand(operand) => operand_method(operand, name, args),
            Value::Predicate(predicate) => predicate_method(predicate, name, args),
            other => Err(TopologyError::UnknownMethod {
                receiver: other.kind(),
                method: name.to_string(),
            }),
        }
    }

    fn vocabulary(&mut self, verb: &str, args: Args) -> Result<Value, TopologyError> {
        let positional = positional_only(verb, args)?;
        let builder = self.builder.as_mut().ok_or_else(|| {
            TopologyError::MisplacedStep(format!("`{}` outside a route block", verb))
        })?;

        match verb {
            "from" => {
                let [uri] = exactly::<1>(verb, positional)?;
                builder.from(name_arg(verb, &uri)?)?;
            }
            "to" => {
                let [uri] = exactly::<1>(verb, positional)?;
                builder.to(name_arg(verb, &uri)?)?;
            }
            "process" => {
                let [processor] = exactly::<1>(verb, positional)?;
                builder.process(processor_arg(verb, processor)?)?;
            }
            "process_ref" => {
                let [key] = exactly::<1>(verb, positional)?;
                builder.process_ref(name_arg(verb, &key)?)?;
            }
            "intercept" => {
                let predicate = match at_most_one(verb, positional)? {
                    Some(value) => Some(predicate_arg(verb, value)?),
                    None => None,
                };
                builder.intercept(predicate)?;
            }
            "when" => {
                let [predicate] = exactly::<1>(verb, positional)?;
                builder.when(predicate_arg(verb, predicate)?)?;
            }
            "set_header" => {
                let [header, value] = exactly::<2>(verb, positional)?;
                let json = json_arg(verb, &value)?;
                builder.set_header(name_arg(verb, &header)?, json)?;
            }
            _ => {
                let [] = exactly::<0>(verb, positional)?;
                match verb {
                    "choice" => builder.choice()?,
                    "otherwise" => builder.otherwise()?,
                    "end" => builder.end()?,
                    "proceed" => builder.proceed()?,
                    "stop" => builder.stop()?,
                    _ => return Err(TopologyError::UnknownName(verb.to_string())),
                };
            }
        }
        Ok(Value::Builder)
    }

    fn builtin(&mut self, name: &str, args: Args) -> Result<Value, TopologyError> {
        let positional = positional_only(name, args)?;
        match name {
            "config" => {
                let [key] = exactly::<1>(name, positional)?;
                let value = match &key {
                    Value::Symbol(sym) => self.config.get(sym)?,
                    other => self.config.get(name_arg(name, other)?)?,
                };
                Ok(Value::Str(value.to_string()))
            }
            "lookup" => {
                let [key] = exactly::<1>(name, positional)?;
                Ok(self
                    .components
                    .lookup(name_arg(name, &key)?)
                    .map(Value::Component)
                    .unwrap_or(Value::Nil))
            }
            "header" => {
                let [header] = exactly::<1>(name, positional)?;
                Ok(Value::Operand(Operand::Header(
                    name_arg(name, &header)?.to_string(),
                )))
            }
            "body" => {
                let [] = exactly::<0>(name, positional)?;
                Ok(Value::Operand(Operand::Body))
            }
            "is_not" => {
                let [predicate] = exactly::<1>(name, positional)?;
                Ok(Value::Predicate(predicate_arg(name, predicate)?.negate()))
            }
            "add_headers" => {
                let headers = match at_most_one(name, positional)? {
                    None | Some(Value::Nil) => None,
                    Some(Value::Map(entries)) => {
                        let mut headers = Vec::with_capacity(entries.len());
                        for (key, value) in &entries {
                            headers.push((key.clone(), json_arg(name, value)?));
                        }
                        Some(headers)
                    }
                    Some(other) => {
                        return Err(TopologyError::TypeMismatch {
                            call: name.to_string(),
                            expected: "a map or nil",
                            found: other.kind(),
                        })
                    }
                };
                Ok(Value::Processor(RouteDefinitionBuilder::add_headers(headers)))
            }
            "route_config" => {
                let [] = exactly::<0>(name, positional)?;
                let processor: ProcessorRef =
                    Arc::new(RouteConfigProcessor::new(self.configurator.clone()));
                Ok(Value::Processor(processor))
            }
            "lookup_plugin" => {
                let [plugin, key] = exactly::<2>(name, positional)?;
                self.capabilities.register_lookup(
                    name_arg(name, &plugin)?,
                    name_arg(name, &key)?,
                    Origin::Script,
                )?;
                Ok(Value::Nil)
            }
            "register_plugin" => {
                let [plugin, type_name] = exactly::<2>(name, positional)?;
                let descriptor = self.types.get(name_arg(name, &type_name)?);
                self.capabilities
                    .register_type(name_arg(name, &plugin)?, descriptor, Origin::Script)?;
                Ok(Value::Nil)
            }
            _ => Err(TopologyError::UnknownName(name.to_string())),
        }
    }
}

fn operand_method(operand: Operand, name: &str, args: Args) -> Result<Value, TopologyError> {
    let positional = positional_only(name, args)?;
    let predicate = match name {
        "is_equal_to" => {
            let [value] = exactly::<1>(name, positional)?;
            Predicate::Equals(operand, json_arg(name, &value)?)
        }
        "is_not_equal_to" => {
            let [value] = exactly::<1>(name, positional)?;
            Predicate::NotEquals(operand, json_arg(name, &value)?)
        }
        "is_null" => {
            let [] = exactly::<0>(name, positional)?;
            Predicate::IsNull(operand)
        }
        "is_not_null" => {
            let [] = exactly::<0>(name, positional)?;
            Predicate::IsNotNull(operand)
        }
        "contains" => {
            let [needle] = exactly::<1>(name, positional)?;
            Predicate::Contains(operand, text_arg(name, &needle)?)
        }
        "starts_with" => {
            let [prefix] = exactly::<1>(name, positional)?;
            Predicate::StartsWith(operand, text_arg(name, &prefix)?)
        }
        _ => {
            return Err(TopologyError::UnknownMethod {
                receiver: "expression",
                method: name.to_string(),
            })
        }
    };
    Ok(Value::Predicate(predicate))
}

fn predicate_method(predicate: Predicate, name: &str, args: Args) -> Result<Value, TopologyError> {
    let positional = positional_only(name, args)?;
    let combined = match name {
        "and" => {
            let [other] = exactly::<1>(name, positional)?;
            predicate.and(predicate_arg(name, other)?)
        }
        "or" => {
            let [other] = exactly::<1>(name, positional)?;
            predicate.or(predicate_arg(name, other)?)
        }
        "negate" => {
            let [] = exactly::<0>(name, positional)?;
            predicate.negate()
        }
        _ => {
            return Err(TopologyError::UnknownMethod {
                receiver: "predicate",
                method: name.to_string(),
            })
        }
    };
    Ok(Value::Predicate(combined))
}

fn reject_nested_routes(stmts: &[Stmt]) -> Result<(), TopologyError> {
    for stmt in stmts {
        if let Stmt::Route { body, .. } = stmt {
            if body.iter().any(|s| matches!(s, Stmt::Route { .. })) {
                return Err(TopologyError::MisplacedStep(
                    "route block nested inside a route block".to_string(),
                ));
            }
            reject_nested_routes(body)?;
        }
    }
    Ok(())
}

fn positional_only(call: &str, args: Args) -> Result<Vec<Value>, TopologyError> {
    if !args.named.is_empty() {
        return Err(TopologyError::TypeMismatch {
            call: call.to_string(),
            expected: "positional arguments",
            found: "named arguments",
        });
    }
    Ok(args.positional)
}

fn exactly<const N: usize>(call: &str, values: Vec<Value>) -> Result<[Value; N], TopologyError> {
    let found = values.len();
    values.try_into().map_err(|_| TopologyError::TypeMismatch {
        call: call.to_string(),
        expected: match N {
            0 => "no arguments",
            1 => "one argument",
            2 => "two arguments",
            _ => "a different number of arguments",
        },
        found: match found {
            0 => "none",
            1 => "one",
            2 => "two",
            _ => "more",
        },
    })
}

fn at_most_one(call: &str, values: Vec<Value>) -> Result<Option<Value>, TopologyError> {
    if values.len() > 1 {
        return Err(TopologyError::TypeMismatch {
            call: call.to_string(),
            expected: "at most one argument",
            found: "more",
        });
    }
    Ok(values.into_iter().next())
}

fn name_arg<'v>(call: &str, value: &'v Value) -> Result<&'v str, TopologyError> {
    value.as_name().ok_or_else(|| TopologyError::TypeMismatch {
        call: call.to_string(),
        expected: "a string or symbol",
        found: value.kind(),
    })
}

fn text_arg(call: &str, value: &Value) -> Result<String, TopologyError> {
    match value {
        Value::Str(_) | Value::Symbol(_) => Ok(name_arg(call, value)?.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(TopologyError::TypeMismatch {
            call: call.to_string(),
            expected: "text",
            found: other.kind(),
        }),
    }
}

fn json_arg(call: &str, value: &Value) -> Result<JsonValue, TopologyError> {
    value.to_json().ok_or_else(|| TopologyError::TypeMismatch {
        call: call.to_string(),
        expected: "plain data",
        found: value.kind(),
    })
}

fn predicate_arg(call: &str, value: Value) -> Result<Predicate, TopologyError> {
    match value {
        Value::Predicate(p) => Ok(p),
        other => Err(TopologyError::TypeMismatch {
            call: call.to_string(),
            expected: "a predicate",
            found: other.kind(),
        }),
    }
}

fn processor_arg(call: &str, value: Value) -> Result<ProcessorRef, TopologyError> {
    match value {
        Value::Processor(p) => Ok(p),
        Value::Component(component) => {
            let found = component.type_name().to_string();
            component.as_processor().ok_or_else(|| {
                tracing::debug!(call, component = %found, "Component is not a processor");
                TopologyError::TypeMismatch {
                    call: call.to_string(),
                    expected: "a processor",
                    found: "component",
                }
            })
        }
        other => Err(TopologyError::TypeMismatch {
            call: call.to_string(),
            expected: "a processor",
            found: other.kind(),
        }),
    }
}
