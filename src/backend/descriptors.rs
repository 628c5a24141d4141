use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::analysis::symbols::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bank {
    Saved,
    Temporary,
    FloatSaved,
    FloatTemporary,
}

impl Bank {
    pub const ALL: [Bank; 4] = [Bank::Saved, Bank::Temporary, Bank::FloatSaved, Bank::FloatTemporary];

    pub fn size(self) -> u8 {
        match self {
            Bank::Saved => 8,
            Bank::Temporary => 10,
            Bank::FloatSaved => 8,
            Bank::FloatTemporary => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Bank::FloatSaved | Bank::FloatTemporary)
    }
}

/// An allocatable MIPS register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register {
    pub bank: Bank,
    pub index: u8,
}

impl Register {
    pub fn new(bank: Bank, index: u8) -> Self {
        Self { bank, index }
    }

    pub fn is_float(self) -> bool {
        self.bank.is_float()
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bank {
            Bank::Saved => write!(f, "$s{}", self.index),
            Bank::Temporary => write!(f, "$t{}", self.index),
            Bank::FloatSaved => write!(f, "$f{}", 20 + self.index),
            Bank::FloatTemporary => write!(f, "$f{}", 4 + self.index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(Register),
    Memory,
}

/// Register descriptor (register -> objects whose current value it holds)
/// paired with the address descriptor (object -> places its current value
/// can be found).
#[derive(Debug, Clone)]
pub struct Descriptors {
    registers: HashMap<Register, BTreeSet<ObjectId>>,
    addresses: HashMap<ObjectId, Vec<Location>>,
}

impl Default for Descriptors {
    fn default() -> Self {
        Self::new()
    }
}

impl Descriptors {
    pub fn new() -> Self {
        let mut registers = HashMap::new();
        for bank in Bank::ALL {
            for index in 0..bank.size() {
                registers.insert(Register::new(bank, index), BTreeSet::new());
            }
        }
        Self {
            registers,
            addresses: HashMap::new(),
        }
    }

    pub fn contents(&self, register: Register) -> impl Iterator<Item = ObjectId> + '_ {
        self.registers.get(&register).into_iter().flatten().copied()
    }

    pub fn is_empty(&self, register: Register) -> bool {
        self.registers.get(&register).map_or(true, |set| set.is_empty())
    }

    pub fn occupancy(&self, register: Register) -> usize {
        self.registers.get(&register).map_or(0, |set| set.len())
    }

    pub fn register_of(&self, object: ObjectId) -> Option<Register> {
        self.addresses.get(&object)?.iter().find_map(|loc| match loc {
            Location::Register(r) => Some(*r),
            Location::Memory => None,
        })
    }

    pub fn in_memory(&self, object: ObjectId) -> bool {
        self.addresses
            .get(&object)
            .map_or(true, |locs| locs.contains(&Location::Memory))
    }

    /// Value held only in a register.
    pub fn is_dirty(&self, object: ObjectId) -> bool {
        self.register_of(object).is_some() && !self.in_memory(object)
    }

    /// Removes an object from whatever register holds it.
    pub fn detach(&mut self, object: ObjectId) {
        if let Some(register) = self.register_of(object) {
            if let Some(set) = self.registers.get_mut(&register) {
                set.remove(&object);
            }
        }
        if let Some(locs) = self.addresses.get_mut(&object) {
            locs.retain(|loc| *loc == Location::Memory);
        }
    }

    /// The object was just written into `register`; its memory copy is stale.
    pub fn bind(&mut self, object: ObjectId, register: Register) {
        self.detach(object);
        self.registers.entry(register).or_default().insert(object);
        self.addresses.insert(object, vec![Location::Register(register)]);
    }

    /// The object was loaded from memory into `register`.
    pub fn loaded(&mut self, object: ObjectId, register: Register) {
        self.detach(object);
        self.registers.entry(register).or_default().insert(object);
        self.addresses
            .insert(object, vec![Location::Register(register), Location::Memory]);
    }

    pub fn spilled(&mut self, object: ObjectId) {
        let locs = self.addresses.entry(object).or_default();
        if !locs.contains(&Location::Memory) {
            locs.push(Location::Memory);
        }
    }

    /// Value only in memory from now on.
    pub fn forget(&mut self, object: ObjectId) {
        self.detach(object);
        self.addresses.insert(object, vec![Location::Memory]);
    }

    /// Empties a register. Dirty objects in it must be spilled first.
    pub fn evict(&mut self, register: Register) {
        let objects: Vec<ObjectId> = self.contents(register).collect();
        for object in objects {
            self.detach(object);
        }
    }

    /// Every register forgotten; memory is assumed current.
    pub fn clear(&mut self) {
        for set in self.registers.values_mut() {
            set.clear();
        }
        for locs in self.addresses.values_mut() {
            locs.clear();
            locs.push(Location::Memory);
        }
    }

    /// Objects whose only copy is in a register, in a stable order.
    pub fn dirty_objects(&self) -> Vec<(ObjectId, Register)> {
        let mut dirty: Vec<(ObjectId, Register)> = self
            .addresses
            .keys()
            .filter(|&&o| self.is_dirty(o))
            .filter_map(|&o| self.register_of(o).map(|r| (o, r)))
            .collect();
        dirty.sort();
        dirty
    }

    /// First empty register of the given banks, in order.
    pub fn free_register(&self, banks: &[Bank], ignore: &[Register]) -> Option<Register> {
        banks
            .iter()
            .flat_map(|&bank| (0..bank.size()).map(move |i| Register::new(bank, i)))
            .find(|r| !ignore.contains(r) && self.is_empty(*r))
    }

    /// Register of the given banks holding the fewest objects; the earliest wins a tie.
    pub fn least_occupied(&self, banks: &[Bank], ignore: &[Register]) -> Option<Register> {
        let mut best: Option<(usize, Register)> = None;
        for &bank in banks {
            for index in 0..bank.size() {
                let register = Register::new(bank, index);
                if ignore.contains(&register) {
                    continue;
                }
                let occupancy = self.occupancy(register);
                if best.map_or(true, |(count, _)| occupancy < count) {
                    best = Some((occupancy, register));
                }
            }
        }
        best.map(|(_, register)| register)
    }

    /// Both descriptors agree and no object sits in two registers.
    pub fn is_consistent(&self) -> bool {
        for (register, set) in &self.registers {
            for object in set {
                if self.register_of(*object) != Some(*register) {
                    return false;
                }
            }
        }
        self.addresses.iter().all(|(object, locs)| {
            let in_registers = locs
                .iter()
                .filter(|loc| matches!(loc, Location::Register(_)))
                .count();
            in_registers <= 1
                && locs.iter().all(|loc| match loc {
                    Location::Register(r) => self
                        .registers
                        .get(r)
                        .map_or(false, |set| set.contains(object)),
                    Location::Memory => true,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S0: Register = Register { bank: Bank::Saved, index: 0 };
    const S1: Register = Register { bank: Bank::Saved, index: 1 };
    const T0: Register = Register { bank: Bank::Temporary, index: 0 };

    #[test]
    fn test_register_names() {
        assert_eq!(S1.to_string(), "$s1");
        assert_eq!(Register::new(Bank::Temporary, 9).to_string(), "$t9");
        assert_eq!(Register::new(Bank::FloatSaved, 0).to_string(), "$f20");
        assert_eq!(Register::new(Bank::FloatTemporary, 7).to_string(), "$f11");
    }

    #[test]
    fn test_bind_moves_object() {
        let mut d = Descriptors::new();
        let a = ObjectId(0);
        d.bind(a, S0);
        assert!(d.is_dirty(a));
        d.bind(a, S1);
        assert_eq!(d.register_of(a), Some(S1));
        assert!(d.is_empty(S0));
        assert!(d.is_consistent());
    }

    #[test]
    fn test_shared_register_and_detach() {
        let mut d = Descriptors::new();
        let (a, b) = (ObjectId(0), ObjectId(1));
        d.bind(a, S0);
        d.bind(b, S0);
        assert_eq!(d.occupancy(S0), 2);

        // writing a new value to `a` leaves `b` alone
        d.bind(a, S1);
        assert_eq!(d.contents(S0).collect::<Vec<_>>(), vec![b]);
        assert!(d.is_consistent());
    }

    #[test]
    fn test_spill_and_clear() {
        let mut d = Descriptors::new();
        let a = ObjectId(3);
        d.bind(a, T0);
        assert_eq!(d.dirty_objects(), vec![(a, T0)]);
        d.spilled(a);
        assert!(!d.is_dirty(a));
        assert!(d.dirty_objects().is_empty());

        d.clear();
        assert_eq!(d.register_of(a), None);
        assert!(d.in_memory(a));
        assert!(d.is_consistent());
    }

    #[test]
    fn test_free_and_least_occupied() {
        let mut d = Descriptors::new();
        assert_eq!(d.free_register(&[Bank::Saved], &[]), Some(S0));
        assert_eq!(d.free_register(&[Bank::Saved], &[S0]), Some(S1));

        for i in 0..8 {
            d.bind(ObjectId(i as usize), Register::new(Bank::Saved, i));
        }
        d.bind(ObjectId(100), S0);
        assert_eq!(d.free_register(&[Bank::Saved], &[]), None);
        // S0 holds two objects, so S1 is the cheapest victim
        assert_eq!(d.least_occupied(&[Bank::Saved], &[]), Some(S1));
        assert_eq!(
            d.least_occupied(&[Bank::Saved, Bank::Temporary], &[]),
            Some(T0)
        );
    }

    #[test]
    fn test_evict() {
        let mut d = Descriptors::new();
        let (a, b) = (ObjectId(0), ObjectId(1));
        d.loaded(a, S0);
        d.bind(b, S0);
        d.spilled(b);
        d.evict(S0);
        assert!(d.is_empty(S0));
        assert_eq!(d.register_of(a), None);
        assert!(d.in_memory(a) && d.in_memory(b));
    }
}
