//! The machine registry: ELF `e_machine` values this crate recognizes,
//! and the descriptor of the host this code was built for.

use crate::endian::Endian;

/// Size class of a target, mirroring ELF's `EI_CLASS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSize {
    Bits32,
    Bits64,
}

impl WordSize {
    pub fn from_ei_class(v: u8) -> Option<WordSize> {
        match v {
            1 => Some(WordSize::Bits32),
            2 => Some(WordSize::Bits64),
            _ => None,
        }
    }

    pub fn to_ei_class(self) -> u8 {
        match self {
            WordSize::Bits32 => 1,
            WordSize::Bits64 => 2,
        }
    }
}

/// A known ELF machine and its canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineDescriptor {
    pub e_machine: u16,
    pub name: &'static str,
    pub wordsize: WordSize,
    pub endian: crate::endian::Endian,
}

/// Curated subset of `e_machine` values relevant to FatELF composition,
/// paired with the word size and byte order each one is conventionally
/// built in.
const REGISTRY: &[MachineDescriptor] = &[
    MachineDescriptor { e_machine: 0x02, name: "sparc", wordsize: WordSize::Bits32, endian: Endian::Big },
    MachineDescriptor { e_machine: 0x03, name: "i386", wordsize: WordSize::Bits32, endian: Endian::Little },
    MachineDescriptor { e_machine: 0x04, name: "m68k", wordsize: WordSize::Bits32, endian: Endian::Big },
    MachineDescriptor { e_machine: 0x08, name: "mips", wordsize: WordSize::Bits32, endian: Endian::Big },
    MachineDescriptor { e_machine: 0x0F, name: "parisc", wordsize: WordSize::Bits32, endian: Endian::Big },
    MachineDescriptor { e_machine: 0x14, name: "ppc", wordsize: WordSize::Bits32, endian: Endian::Big },
    MachineDescriptor { e_machine: 0x15, name: "ppc64", wordsize: WordSize::Bits64, endian: Endian::Big },
    MachineDescriptor { e_machine: 0x16, name: "s390", wordsize: WordSize::Bits32, endian: Endian::Big },
    MachineDescriptor { e_machine: 0x28, name: "arm", wordsize: WordSize::Bits32, endian: Endian::Little },
    MachineDescriptor { e_machine: 0x29, name: "alpha", wordsize: WordSize::Bits64, endian: Endian::Little },
    MachineDescriptor { e_machine: 0x2A, name: "sh", wordsize: WordSize::Bits32, endian: Endian::Little },
    MachineDescriptor { e_machine: 0x2B, name: "sparc64", wordsize: WordSize::Bits64, endian: Endian::Big },
    MachineDescriptor { e_machine: 0x32, name: "ia64", wordsize: WordSize::Bits64, endian: Endian::Little },
    MachineDescriptor { e_machine: 0x3E, name: "x86_64", wordsize: WordSize::Bits64, endian: Endian::Little },
    MachineDescriptor { e_machine: 0xB7, name: "aarch64", wordsize: WordSize::Bits64, endian: Endian::Little },
    MachineDescriptor { e_machine: 0xF3, name: "riscv", wordsize: WordSize::Bits32, endian: Endian::Little },
    MachineDescriptor { e_machine: 0x101, name: "loongarch", wordsize: WordSize::Bits64, endian: Endian::Little },
];

/// Look up a machine descriptor by its ELF `e_machine` code.
pub fn descriptor_for_machine(e_machine: u16) -> Option<MachineDescriptor> {
    REGISTRY.iter().copied().find(|d| d.e_machine == e_machine)
}

/// Look up a machine descriptor by the exact tuple of fields an ELF
/// identity read produces. `osabi` is accepted for parity with that
/// identity (and to leave room for OSABI-specific entries later) but
/// isn't used to discriminate today: this registry tracks one
/// canonical word size and byte order per machine, not per-OSABI
/// variants.
pub fn lookup_by_elf_codes(
    machine: u16,
    _osabi: u8,
    class: WordSize,
    endian: Endian,
) -> Option<MachineDescriptor> {
    REGISTRY
        .iter()
        .copied()
        .find(|d| d.e_machine == machine && d.wordsize == class && d.endian == endian)
}

/// Look up a machine descriptor by name, accepting a handful of common
/// aliases alongside the canonical name.
pub fn descriptor_for_name(name: &str) -> Option<MachineDescriptor> {
    let name = name.to_ascii_lowercase();
    REGISTRY.iter().copied().find(|d| {
        d.name == name
            || (d.name == "x86_64" && (name == "x86-64" || name == "amd64"))
            || (d.name == "i386" && (name == "x86" || name == "x86_32"))
            || (d.name == "riscv" && name == "riscv32")
    })
}

/// The descriptor for the architecture this code was compiled for, if
/// the registry recognizes it. `host_descriptor()` returning `None` is
/// a configuration error at the CLI layer, not a panic here.
pub fn host_descriptor() -> Option<MachineDescriptor> {
    #[cfg(target_arch = "x86_64")]
    return descriptor_for_machine(0x3E);
    #[cfg(target_arch = "x86")]
    return descriptor_for_machine(0x03);
    #[cfg(target_arch = "aarch64")]
    return descriptor_for_machine(0xB7);
    #[cfg(target_arch = "arm")]
    return descriptor_for_machine(0x28);
    #[cfg(target_arch = "riscv64")]
    return descriptor_for_machine(0xF3);
    #[cfg(target_arch = "riscv32")]
    return descriptor_for_machine(0xF3);
    #[cfg(target_arch = "powerpc64")]
    return descriptor_for_machine(0x15);
    #[cfg(target_arch = "powerpc")]
    return descriptor_for_machine(0x14);
    #[cfg(target_arch = "s390x")]
    return descriptor_for_machine(0x16);
    #[cfg(not(any(
        target_arch = "x86_64",
        target_arch = "x86",
        target_arch = "aarch64",
        target_arch = "arm",
        target_arch = "riscv64",
        target_arch = "riscv32",
        target_arch = "powerpc64",
        target_arch = "powerpc",
        target_arch = "s390x"
    )))]
    return None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_x86_64() {
        let d = descriptor_for_machine(0x3E).unwrap();
        assert_eq!(d.name, "x86_64");
        assert_eq!(d.wordsize, WordSize::Bits64);
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(descriptor_for_machine(0xDEAD).is_none());
    }

    #[test]
    fn test_name_alias() {
        let d = descriptor_for_name("amd64").unwrap();
        assert_eq!(d.e_machine, 0x3E);
        let d2 = descriptor_for_name("x86-64").unwrap();
        assert_eq!(d2.e_machine, 0x3E);
    }

    #[test]
    fn test_host_descriptor_present_on_common_targets() {
        // This test only asserts the function doesn't panic; whether a
        // descriptor is returned depends on the build host's arch.
        let _ = host_descriptor();
    }

    #[test]
    fn test_lookup_by_elf_codes_matches_machine_class_and_endian() {
        let d = lookup_by_elf_codes(0x3E, 0, WordSize::Bits64, Endian::Little).unwrap();
        assert_eq!(d.name, "x86_64");
    }

    #[test]
    fn test_lookup_by_elf_codes_rejects_wrong_endian() {
        assert!(lookup_by_elf_codes(0x3E, 0, WordSize::Bits64, Endian::Big).is_none());
    }

    #[test]
    fn test_lookup_by_elf_codes_rejects_wrong_class() {
        assert!(lookup_by_elf_codes(0x3E, 0, WordSize::Bits32, Endian::Little).is_none());
    }
}
