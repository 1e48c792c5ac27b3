use std::collections::HashMap;

use crate::graph::config::NodeConfig;
use crate::graph::packet::Packet;
use crate::graph::runner::GraphError;

/// A graph node. Nodes run in config order on the graph's worker thread;
/// each consumes the previous node's output packet.
pub trait Calculator: Send {
    fn process(&mut self, packet: Packet) -> Result<Packet, Box<dyn std::error::Error + Send + Sync>>;
}

type CalculatorFactory =
    Box<dyn Fn(&NodeConfig) -> Result<Box<dyn Calculator>, GraphError> + Send + Sync>;

/// Maps calculator names (as written in graph configs) to factories.
pub struct CalculatorRegistry {
    factories: HashMap<String, CalculatorFactory>,
}

impl CalculatorRegistry {
    /// An empty registry. Useful for tests that register stubs.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// The standard registry with the built-in calculators.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(
            crate::detection::infrastructure::blazeface_calculator::CALCULATOR_NAME,
            |node| {
                let calc =
                    crate::detection::infrastructure::blazeface_calculator::BlazeFaceCalculator::from_node_config(node)?;
                Ok(Box::new(calc))
            },
        );
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&NodeConfig) -> Result<Box<dyn Calculator>, GraphError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn build(&self, node: &NodeConfig) -> Result<Box<dyn Calculator>, GraphError> {
        let factory = self
            .factories
            .get(&node.calculator)
            .ok_or_else(|| GraphError::UnknownCalculator(node.calculator.clone()))?;
        factory(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::packet::{PacketPayload, Timestamp};
    use std::collections::BTreeMap;

    struct Passthrough;

    impl Calculator for Passthrough {
        fn process(
            &mut self,
            packet: Packet,
        ) -> Result<Packet, Box<dyn std::error::Error + Send + Sync>> {
            Ok(packet)
        }
    }

    fn node(name: &str) -> NodeConfig {
        NodeConfig {
            calculator: name.to_string(),
            options: BTreeMap::new(),
        }
    }

    #[test]
    fn test_registered_calculator_is_built() {
        let mut registry = CalculatorRegistry::empty();
        registry.register("Passthrough", |_| Ok(Box::new(Passthrough)));
        let mut calc = registry.build(&node("Passthrough")).unwrap();
        let out = calc
            .process(Packet::detections(vec![], Timestamp(1)))
            .unwrap();
        assert!(matches!(out.payload, PacketPayload::Detections(_)));
    }

    #[test]
    fn test_unknown_calculator_is_rejected() {
        let registry = CalculatorRegistry::empty();
        let Err(err) = registry.build(&node("NoSuchCalculator")) else {
            panic!("unknown calculator must not build");
        };
        assert!(matches!(err, GraphError::UnknownCalculator(name) if name == "NoSuchCalculator"));
    }

    #[test]
    fn test_defaults_include_blazeface() {
        // Built without a model file the factory must fail, but the name
        // itself resolves.
        let registry = CalculatorRegistry::with_defaults();
        let Err(err) = registry.build(&node("BlazeFaceCalculator")) else {
            panic!("building without a model file must fail");
        };
        assert!(!matches!(err, GraphError::UnknownCalculator(_)));
    }
}
