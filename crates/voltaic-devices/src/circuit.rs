//! Circuit container and compilation.
//!
//! [`Circuit`] is the front-end-facing element list. [`Circuit::compile`]
//! flattens composites, assigns node and extra-variable indices, resolves
//! cross-element references (controlled sources, couplings), and yields an
//! immutable-layout [`CompiledCircuit`], which is all the solvers see.

use indexmap::IndexMap;
use nalgebra::DVector;
use voltaic_core::MnaSystem;

use crate::companion::{IntegrationMethod, mutual_branch};
use crate::controlled::{Cccs, Ccvs, Vccs, Vcvs};
use crate::coupling::{Coupling, MutualPair, dot_sign};
use crate::diode::Diode;
use crate::element::{
    AssembleCtx, CompPairSpec, ControlSignal, Element, ElementState, SwitchState,
};
use crate::error::{Error, Result};
use crate::mosfet::Mosfet;
use crate::passive::{Capacitor, Inductor, Resistor};
use crate::source::{CurrentSource, VoltageSource};
use crate::transformer::{IdealTransformer, Transformer, Winding};
use crate::waveform::Waveform;

/// Editable element list.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    elements: Vec<Element>,
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: Element) -> &mut Self {
        self.elements.push(element);
        self
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    // Construction conveniences mirroring the element constructors.

    pub fn add_resistor(
        &mut self,
        name: &str,
        a: &str,
        b: &str,
        ohms: f64,
    ) -> Result<&mut Self> {
        self.push(Element::Resistor(Resistor::new(name, a, b, ohms)?));
        Ok(self)
    }

    pub fn add_capacitor(
        &mut self,
        name: &str,
        a: &str,
        b: &str,
        farads: f64,
        ic: Option<f64>,
    ) -> Result<&mut Self> {
        self.push(Element::Capacitor(Capacitor::new(name, a, b, farads, ic)?));
        Ok(self)
    }

    pub fn add_inductor(
        &mut self,
        name: &str,
        a: &str,
        b: &str,
        henries: f64,
        ic: Option<f64>,
        dot_node: Option<&str>,
    ) -> Result<&mut Self> {
        self.push(Element::Inductor(Inductor::new(
            name,
            a,
            b,
            henries,
            ic,
            dot_node.map(str::to_string),
        )?));
        Ok(self)
    }

    pub fn add_coupling(&mut self, name: &str, l1: &str, l2: &str, k: f64) -> Result<&mut Self> {
        self.push(Element::Coupling(Coupling::new(name, l1, l2, k)?));
        Ok(self)
    }

    pub fn add_voltage_source(
        &mut self,
        name: &str,
        pos: &str,
        neg: &str,
        waveform: Waveform,
    ) -> Result<&mut Self> {
        self.push(Element::VoltageSource(VoltageSource::new(
            name, pos, neg, waveform,
        )?));
        Ok(self)
    }

    pub fn add_dc_voltage(&mut self, name: &str, pos: &str, neg: &str, v: f64) -> Result<&mut Self> {
        self.add_voltage_source(name, pos, neg, Waveform::dc(v))
    }

    pub fn add_current_source(
        &mut self,
        name: &str,
        a: &str,
        b: &str,
        waveform: Waveform,
    ) -> Result<&mut Self> {
        self.push(Element::CurrentSource(CurrentSource::new(
            name, a, b, waveform,
        )?));
        Ok(self)
    }

    pub fn add_vcvs(
        &mut self,
        name: &str,
        out: (&str, &str),
        ctrl: (&str, &str),
        gain: f64,
    ) -> Result<&mut Self> {
        self.push(Element::Vcvs(Vcvs::new(
            name, out.0, out.1, ctrl.0, ctrl.1, gain,
        )?));
        Ok(self)
    }

    pub fn add_vccs(
        &mut self,
        name: &str,
        out: (&str, &str),
        ctrl: (&str, &str),
        gm: f64,
    ) -> Result<&mut Self> {
        self.push(Element::Vccs(Vccs::new(
            name, out.0, out.1, ctrl.0, ctrl.1, gm,
        )?));
        Ok(self)
    }

    pub fn add_cccs(
        &mut self,
        name: &str,
        out: (&str, &str),
        ctrl_element: &str,
        gain: f64,
    ) -> Result<&mut Self> {
        self.push(Element::Cccs(Cccs::new(
            name,
            out.0,
            out.1,
            ctrl_element,
            gain,
        )?));
        Ok(self)
    }

    pub fn add_ccvs(
        &mut self,
        name: &str,
        out: (&str, &str),
        ctrl_element: &str,
        gain: f64,
    ) -> Result<&mut Self> {
        self.push(Element::Ccvs(Ccvs::new(
            name,
            out.0,
            out.1,
            ctrl_element,
            gain,
        )?));
        Ok(self)
    }

    pub fn add_ideal_diode(
        &mut self,
        name: &str,
        anode: &str,
        cathode: &str,
        vf: f64,
        ron: f64,
    ) -> Result<&mut Self> {
        self.push(Element::Diode(Diode::ideal(name, anode, cathode, vf, ron)?));
        Ok(self)
    }

    pub fn add_shockley_diode(
        &mut self,
        name: &str,
        anode: &str,
        cathode: &str,
        is_sat: f64,
        n: f64,
        vt: f64,
    ) -> Result<&mut Self> {
        self.push(Element::Diode(Diode::shockley(
            name, anode, cathode, is_sat, n, vt,
        )?));
        Ok(self)
    }

    pub fn add_mosfet_switch(
        &mut self,
        name: &str,
        d: &str,
        g: &str,
        s: &str,
        vth: f64,
        ron: f64,
        roff: f64,
    ) -> Result<&mut Self> {
        self.push(Element::Mosfet(Mosfet::switch(name, d, g, s, vth, ron, roff)?));
        Ok(self)
    }

    pub fn add_mosfet(
        &mut self,
        name: &str,
        d: &str,
        g: &str,
        s: &str,
        vth: f64,
        kp: f64,
        w: f64,
        l: f64,
    ) -> Result<&mut Self> {
        self.push(Element::Mosfet(Mosfet::square_law(
            name, d, g, s, vth, kp, w, l,
        )?));
        Ok(self)
    }

    pub fn add_ideal_transformer(
        &mut self,
        name: &str,
        primary: (&str, &str),
        secondary: (&str, &str),
        ratio: f64,
    ) -> Result<&mut Self> {
        self.push(Element::IdealTransformer(IdealTransformer::new(
            name,
            primary.0,
            primary.1,
            secondary.0,
            secondary.1,
            ratio,
        )?));
        Ok(self)
    }

    pub fn add_transformer(
        &mut self,
        name: &str,
        windings: Vec<Winding>,
        coupling: Vec<Vec<f64>>,
    ) -> Result<&mut Self> {
        self.push(Element::Transformer(Transformer::new(
            name, windings, coupling,
        )?));
        Ok(self)
    }

    /// Compile into the solver-facing form.
    pub fn compile(self) -> Result<CompiledCircuit> {
        // 1. Flatten composites; the solver never sees them.
        let mut elements = Vec::with_capacity(self.elements.len());
        for e in &self.elements {
            if e.is_composite() {
                elements.extend(e.flatten()?);
            } else {
                elements.push(e.clone());
            }
        }

        // 2. Reject duplicate names (including generated sub-element names).
        let mut by_name: IndexMap<String, usize> = IndexMap::new();
        for (idx, e) in elements.iter().enumerate() {
            if by_name.insert(e.name().to_string(), idx).is_some() {
                return Err(Error::DuplicateName {
                    name: e.name().to_string(),
                });
            }
        }

        // 3. Assign node indices; ground ("0") is never indexed.
        let mut node_names: IndexMap<String, usize> = IndexMap::new();
        for e in &mut elements {
            for term in e.terminals_mut() {
                if term.is_ground() {
                    term.bind(None);
                } else {
                    let next = node_names.len();
                    let idx = *node_names.entry(term.name().to_string()).or_insert(next);
                    term.bind(Some(idx));
                }
            }
        }
        let num_nodes = node_names.len();

        // 4. Bind extra variables in declaration order.
        let mut next_row = num_nodes;
        for e in &mut elements {
            let count = e.extra_vars().len();
            if count > 0 {
                let rows: Vec<usize> = (next_row..next_row + count).collect();
                e.bind_extra_vars(&rows);
                next_row += count;
            }
        }
        let num_extras = next_row - num_nodes;

        // 5. Resolve current-controlled sources to their controlling branch.
        for i in 0..elements.len() {
            let (name, ctrl) = match &elements[i] {
                Element::Cccs(f) => (f.name.clone(), f.ctrl.clone()),
                Element::Ccvs(h) => (h.name.clone(), h.ctrl.clone()),
                _ => continue,
            };
            let target = *by_name.get(&ctrl).ok_or_else(|| Error::UnknownReference {
                element: name.clone(),
                reference: ctrl.clone(),
            })?;
            let row = elements[target]
                .branch_row()
                .ok_or_else(|| Error::NoBranchCurrent {
                    element: name.clone(),
                    reference: ctrl.clone(),
                })?;
            match &mut elements[i] {
                Element::Cccs(f) => f.bind_ctrl(row),
                Element::Ccvs(h) => h.bind_ctrl(row),
                _ => unreachable!(),
            }
        }

        // 6. Resolve couplings into mutual pairs.
        let mut mutual_pairs = Vec::new();
        for e in &elements {
            let Element::Coupling(k) = e else { continue };
            let (i1, l1) = resolve_winding(&elements, &by_name, &k.name, &k.l1)?;
            let (i2, l2) = resolve_winding(&elements, &by_name, &k.name, &k.l2)?;
            mutual_pairs.push(MutualPair {
                elem1: i1,
                elem2: i2,
                branch1: l1.branch_row().expect("inductor bound"),
                branch2: l2.branch_row().expect("inductor bound"),
                m: k.k * (l1.inductance * l2.inductance).sqrt(),
                sign: dot_sign(l1.dot_on_a(), l2.dot_on_a()),
            });
        }

        // 7. Collect complementarity elements.
        let comp_elements: Vec<usize> = elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.comp_pair().is_some())
            .map(|(i, _)| i)
            .collect();

        Ok(CompiledCircuit {
            elements,
            by_name,
            node_names,
            num_nodes,
            num_extras,
            mutual_pairs,
            comp_elements,
        })
    }
}

fn resolve_winding<'a>(
    elements: &'a [Element],
    by_name: &IndexMap<String, usize>,
    coupling: &str,
    l_name: &str,
) -> Result<(usize, &'a Inductor)> {
    let idx = *by_name.get(l_name).ok_or_else(|| Error::UnknownReference {
        element: coupling.to_string(),
        reference: l_name.to_string(),
    })?;
    match &elements[idx] {
        Element::Inductor(l) => Ok((idx, l)),
        _ => Err(Error::UnknownReference {
            element: coupling.to_string(),
            reference: l_name.to_string(),
        }),
    }
}

/// The compiled, index-bound circuit handed to the solvers.
#[derive(Debug, Clone)]
pub struct CompiledCircuit {
    elements: Vec<Element>,
    by_name: IndexMap<String, usize>,
    node_names: IndexMap<String, usize>,
    num_nodes: usize,
    num_extras: usize,
    mutual_pairs: Vec<MutualPair>,
    comp_elements: Vec<usize>,
}

impl CompiledCircuit {
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_extras(&self) -> usize {
        self.num_extras
    }

    /// Total unknown count.
    pub fn size(&self) -> usize {
        self.num_nodes + self.num_extras
    }

    /// MNA index of a named node; `None` for ground or unknown names.
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.node_names.get(name).copied()
    }

    /// Node names in index order.
    pub fn node_names(&self) -> impl Iterator<Item = (&str, usize)> {
        self.node_names.iter().map(|(n, &i)| (n.as_str(), i))
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.by_name.get(name).map(|&i| &self.elements[i])
    }

    pub fn mutual_pairs(&self) -> &[MutualPair] {
        &self.mutual_pairs
    }

    /// Whether any element's stamp depends on the Newton iterate.
    pub fn has_nonlinear(&self) -> bool {
        self.elements.iter().any(Element::is_nonlinear)
    }

    /// Whether any element exposes a complementarity pair.
    pub fn has_complementarity(&self) -> bool {
        !self.comp_elements.is_empty()
    }

    /// Current complementarity pair descriptors, in element order.
    pub fn comp_pairs(&self) -> Vec<CompPairSpec> {
        self.comp_elements
            .iter()
            .map(|&i| self.elements[i].comp_pair().expect("comp element"))
            .collect()
    }

    /// Feed a solved complementarity vector back into the elements.
    pub fn store_comp_solution(&mut self, z: &[f64], w: &[f64]) {
        for (k, &i) in self.comp_elements.iter().enumerate() {
            self.elements[i].set_comp_solution(z[k], w[k]);
        }
    }

    /// Rebuild the system for one iterate. Clears, stamps every element,
    /// adds mutual-inductance cross terms, and injects Gmin on the node
    /// diagonals. Fails only on non-finite stamps.
    pub fn assemble(
        &self,
        mna: &mut MnaSystem,
        ctx: &AssembleCtx,
        gmin: f64,
    ) -> voltaic_core::Result<()> {
        mna.clear();
        for e in &self.elements {
            e.assemble(mna, ctx);
        }
        if let Some(h) = ctx.h {
            for p in &self.mutual_pairs {
                let i1_prev = self.inductor(p.elem1).current();
                let i2_prev = self.inductor(p.elem2).current();
                let (r_m, rhs1) = mutual_branch(p.m, h, ctx.method, i2_prev);
                mna.add(p.branch1, p.branch2, -p.sign * r_m);
                mna.add_rhs(p.branch1, p.sign * rhs1);
                let (r_m, rhs2) = mutual_branch(p.m, h, ctx.method, i1_prev);
                mna.add(p.branch2, p.branch1, -p.sign * r_m);
                mna.add_rhs(p.branch2, p.sign * rhs2);
            }
        }
        mna.inject_gmin(gmin);
        mna.check_finite()
    }

    fn inductor(&self, idx: usize) -> &Inductor {
        match &self.elements[idx] {
            Element::Inductor(l) => l,
            _ => unreachable!("mutual pair references a non-inductor"),
        }
    }

    /// Initialize element history from a solution (or from element ICs).
    pub fn init_state(&mut self, x: &DVector<f64>, use_ic: bool) {
        for e in &mut self.elements {
            e.init_state(x, use_ic);
        }
    }

    /// Advance all element history after an accepted step.
    pub fn commit(&mut self, x: &DVector<f64>, h: f64, method: IntegrationMethod) {
        for e in &mut self.elements {
            e.commit(x, h, method);
        }
    }

    /// Snapshot every element's committed history.
    pub fn snapshot(&self) -> Vec<ElementState> {
        self.elements.iter().map(Element::state).collect()
    }

    /// Restore a snapshot taken by [`CompiledCircuit::snapshot`].
    pub fn restore(&mut self, snapshot: &[ElementState]) {
        for (e, &s) in self.elements.iter_mut().zip(snapshot.iter()) {
            e.restore(s);
        }
    }

    /// Largest element LTE estimate for a candidate solution.
    pub fn max_lte(&self, x_new: &DVector<f64>, h: f64) -> f64 {
        self.elements
            .iter()
            .map(|e| e.lte(x_new, h))
            .fold(0.0, f64::max)
    }

    /// Apply an external control input to a named element.
    ///
    /// Returns false when the name is unknown (the caller decides whether
    /// that is worth a diagnostic).
    pub fn set_control(&mut self, name: &str, signal: ControlSignal) -> bool {
        match self.by_name.get(name).copied() {
            Some(i) => {
                self.elements[i].set_control(signal);
                true
            }
            None => false,
        }
    }

    /// Branch current of a named element at a solution.
    pub fn branch_current(&self, name: &str, x: &DVector<f64>, ctx: &AssembleCtx) -> Option<f64> {
        self.element(name).and_then(|e| e.branch_current(x, ctx))
    }

    /// Switch states of every switching element at a solution.
    pub fn switch_states(&self, x: &DVector<f64>) -> Vec<(String, SwitchState)> {
        self.elements
            .iter()
            .filter_map(|e| e.switch_state(x).map(|s| (e.name().to_string(), s)))
            .collect()
    }

    /// PWL sources that do not cover the transient window; used by the
    /// driver to push clamp diagnostics.
    pub fn pwl_coverage_gaps(&self, t_stop: f64) -> Vec<String> {
        self.elements
            .iter()
            .filter_map(|e| {
                let w = match e {
                    Element::VoltageSource(v) => &v.waveform,
                    Element::CurrentSource(i) => &i.waveform,
                    _ => return None,
                };
                if w.covers(t_stop) {
                    None
                } else {
                    Some(e.name().to_string())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use voltaic_core::solve_dense;

    fn ctx<'a>(x: &'a DVector<f64>) -> AssembleCtx<'a> {
        AssembleCtx {
            t: 0.0,
            h: None,
            method: IntegrationMethod::BackwardEuler,
            x_prev: x,
            x_iter: x,
            source_scale: 1.0,
        }
    }

    #[test]
    fn ground_is_never_indexed() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_resistor("R1", "in", "out", 1e3).unwrap();
        c.add_resistor("R2", "out", "0", 2e3).unwrap();
        let compiled = c.compile().unwrap();

        assert_eq!(compiled.num_nodes(), 2);
        assert_eq!(compiled.node_index("0"), None);
        assert_eq!(compiled.node_index("in"), Some(0));
        assert_eq!(compiled.node_index("out"), Some(1));
        assert_eq!(compiled.num_extras(), 1); // V1 branch
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut c = Circuit::new();
        c.add_resistor("R1", "a", "0", 1.0).unwrap();
        c.add_resistor("R1", "b", "0", 1.0).unwrap();
        assert!(matches!(
            c.compile(),
            Err(Error::DuplicateName { .. })
        ));
    }

    #[test]
    fn divider_assembles_and_solves() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_resistor("R1", "in", "out", 1e3).unwrap();
        c.add_resistor("R2", "out", "0", 2e3).unwrap();
        let compiled = c.compile().unwrap();

        let x0 = DVector::zeros(compiled.size());
        let mut mna = MnaSystem::new(compiled.num_nodes(), compiled.num_extras());
        compiled.assemble(&mut mna, &ctx(&x0), 1e-12).unwrap();

        let x = solve_dense(&mna.to_dense_matrix(), mna.rhs()).unwrap();
        let out = compiled.node_index("out").unwrap();
        assert_relative_eq!(x[out], 5.0 * 2.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn transformer_composite_flattens_before_indexing() {
        let mut c = Circuit::new();
        c.add_transformer(
            "T1",
            vec![
                Winding::new("p", "0", 1e-3, 2.0),
                Winding::new("s", "0", 0.25e-3, 1.0),
            ],
            vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap();
        let compiled = c.compile().unwrap();

        // Two generated inductors (each with a branch), one coupling.
        assert_eq!(compiled.elements().len(), 3);
        assert_eq!(compiled.num_extras(), 2);
        assert_eq!(compiled.mutual_pairs().len(), 1);
        assert!(compiled.element("T1.L1").is_some());
        assert!(
            !compiled.elements().iter().any(Element::is_composite),
            "no composite may survive compilation"
        );

        let p = compiled.mutual_pairs()[0];
        assert_relative_eq!(p.m, (1e-3 * 0.25e-3_f64).sqrt(), max_relative = 1e-12);
        assert_relative_eq!(p.sign, 1.0);
    }

    #[test]
    fn coupling_to_unknown_inductor_rejected() {
        let mut c = Circuit::new();
        c.add_inductor("L1", "a", "0", 1e-3, None, None).unwrap();
        c.add_coupling("K1", "L1", "L9", 0.9).unwrap();
        assert!(matches!(
            c.compile(),
            Err(Error::UnknownReference { .. })
        ));
    }

    #[test]
    fn cccs_requires_branch_current_on_target() {
        let mut c = Circuit::new();
        c.add_resistor("R1", "a", "0", 1.0).unwrap();
        c.add_cccs("F1", ("b", "0"), "R1", 2.0).unwrap();
        assert!(matches!(
            c.compile(),
            Err(Error::NoBranchCurrent { .. })
        ));
    }

    #[test]
    fn dot_swap_flips_mutual_sign() {
        let mut c = Circuit::new();
        c.add_inductor("L1", "a", "0", 1e-3, None, None).unwrap();
        c.add_inductor("L2", "b", "0", 1e-3, None, Some("0")).unwrap();
        c.add_coupling("K1", "L1", "L2", 1.0).unwrap();
        let compiled = c.compile().unwrap();
        assert_relative_eq!(compiled.mutual_pairs()[0].sign, -1.0);
    }

    #[test]
    fn comp_elements_collected() {
        let mut c = Circuit::new();
        c.add_dc_voltage("V1", "in", "0", 5.0).unwrap();
        c.add_ideal_diode("D1", "in", "out", 0.7, 0.01).unwrap();
        c.add_resistor("R1", "out", "0", 100.0).unwrap();
        let compiled = c.compile().unwrap();

        assert!(compiled.has_complementarity());
        let pairs = compiled.comp_pairs();
        assert_eq!(pairs.len(), 1);
        assert_relative_eq!(pairs[0].vf, 0.7);
    }
}
