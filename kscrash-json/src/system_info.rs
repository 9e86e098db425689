// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Information about the device and CPU that produced a report.

use std::fmt;

/// The platform family a report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// macOS. Instruction addresses are reported untagged.
    Desktop,
    /// iOS and friends, where return addresses may carry pointer tags.
    Mobile,
}

impl Platform {
    pub fn from_system_name(system_name: Option<&str>) -> Platform {
        match system_name {
            Some("macOS") => Platform::Desktop,
            _ => Platform::Mobile,
        }
    }
}

const CPU_ARCH_ABI64: i64 = 0x0100_0000;
const CPU_TYPE_X86: i64 = 7;
const CPU_TYPE_X86_64: i64 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
const CPU_TYPE_ARM: i64 = 12;
const CPU_TYPE_ARM64: i64 = CPU_TYPE_ARM | CPU_ARCH_ABI64;

/// A CPU architecture, as far as register dumps are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuArch {
    Arm64,
    Arm,
    X86,
    X86_64,
    Unknown,
}

impl CpuArch {
    /// Decode a Mach-O `cpu_type_t`. The subtype doesn't change the register set.
    pub fn from_mach(cpu_type: i64) -> CpuArch {
        match cpu_type {
            CPU_TYPE_ARM64 => CpuArch::Arm64,
            CPU_TYPE_ARM => CpuArch::Arm,
            CPU_TYPE_X86 => CpuArch::X86,
            CPU_TYPE_X86_64 => CpuArch::X86_64,
            _ => CpuArch::Unknown,
        }
    }

    /// Decode an architecture name such as `arm64e`, `armv7s` or `i386`.
    pub fn from_name(name: &str) -> CpuArch {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "x86_64" | "x86-64" | "amd64" => CpuArch::X86_64,
            "x86" | "i386" | "i486" | "i686" => CpuArch::X86,
            n if n.starts_with("arm64") || n == "aarch64" => CpuArch::Arm64,
            n if n.starts_with("arm") => CpuArch::Arm,
            _ => CpuArch::Unknown,
        }
    }

    /// The "Code Type" name used in Apple crash reports.
    pub fn code_type(self) -> &'static str {
        match self {
            CpuArch::Arm64 => "ARM-64",
            CpuArch::Arm => "ARM",
            CpuArch::X86 => "X86",
            CpuArch::X86_64 => "X86_64",
            CpuArch::Unknown => "Unknown",
        }
    }

    /// The order registers are listed in a thread state dump.
    ///
    /// Unknown architectures get the arm64 layout, which is what the
    /// overwhelming majority of reports are.
    pub fn register_order(self) -> &'static [&'static str] {
        match self {
            CpuArch::Arm64 | CpuArch::Unknown => &ARM64_REGS[..],
            CpuArch::Arm => &ARM_REGS[..],
            CpuArch::X86 => &X86_REGS[..],
            CpuArch::X86_64 => &X86_64_REGS[..],
        }
    }
}

impl fmt::Display for CpuArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code_type())
    }
}

static ARM64_REGS: [&str; 34] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13", "x14",
    "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27",
    "x28", "fp", "lr", "sp", "pc", "cpsr",
];

static ARM_REGS: [&str; 17] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp", "lr",
    "pc", "cpsr",
];

static X86_REGS: [&str; 16] = [
    "eax", "ebx", "ecx", "edx", "edi", "esi", "ebp", "esp", "ss", "eflags", "eip", "cs", "ds",
    "es", "fs", "gs",
];

static X86_64_REGS: [&str; 21] = [
    "rax", "rbx", "rcx", "rdx", "rdi", "rsi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15", "rip", "rflags", "cs", "fs", "gs",
];

/// Translate a hardware model code into its marketing name.
pub fn device_name(model: &str) -> Option<&'static str> {
    let name = match model {
        "iPod1,1" => "iPod touch 1G",
        "iPod2,1" => "iPod touch 2G",
        "iPod3,1" => "iPod touch 3G",
        "iPod4,1" => "iPod touch 4G",
        "iPod5,1" => "iPod touch 5G",

        "iPad2,5" | "iPad2,6" | "iPad2,7" => "iPad mini 1G",
        "iPad4,4" | "iPad4,5" | "iPad4,6" => "iPad mini 2G",
        "iPad1,1" => "iPad 1G",
        "iPad2,1" | "iPad2,2" | "iPad2,3" | "iPad2,4" => "iPad 2",
        "iPad3,1" | "iPad3,2" | "iPad3,3" => "iPad 3",
        "iPad3,4" | "iPad3,5" | "iPad3,6" => "iPad 4",
        "iPad4,1" | "iPad4,2" | "iPad4,3" => "iPad Air",

        "iPhone1,1" => "iPhone",
        "iPhone1,2" => "iPhone 3G",
        "iPhone2,1" => "iPhone 3GS",
        "iPhone3,1" | "iPhone3,2" | "iPhone3,3" => "iPhone 4",
        "iPhone4,1" => "iPhone 4s",
        "iPhone5,1" | "iPhone5,2" => "iPhone 5",
        "iPhone5,3" | "iPhone5,4" => "iPhone 5c",
        "iPhone6,1" | "iPhone6,2" => "iPhone 5s",
        "iPhone7,1" => "iPhone 6 Plus",
        "iPhone7,2" => "iPhone 6",
        "iPhone8,1" => "iPhone 6s",
        "iPhone8,2" => "iPhone 6s Plus",
        "iPhone8,4" => "iPhone SE",
        "iPhone9,1" | "iPhone9,3" => "iPhone 7",
        "iPhone9,2" | "iPhone9,4" => "iPhone 7 Plus",
        "iPhone10,1" | "iPhone10,4" => "iPhone 8",
        "iPhone10,2" | "iPhone10,5" => "iPhone 8 Plus",
        "iPhone10,3" | "iPhone10,6" => "iPhone X",
        "iPhone11,2" => "iPhone XS",
        "iPhone11,4" | "iPhone11,6" => "iPhone XS Max",
        "iPhone11,8" => "iPhone XR",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_arch() {
        assert_eq!(CpuArch::from_mach(0x0100_000c), CpuArch::Arm64);
        assert_eq!(CpuArch::from_mach(12), CpuArch::Arm);
        assert_eq!(CpuArch::from_mach(7), CpuArch::X86);
        assert_eq!(CpuArch::from_mach(0x0100_0007), CpuArch::X86_64);
        assert_eq!(CpuArch::from_mach(18), CpuArch::Unknown);

        assert_eq!(CpuArch::from_name("arm64e"), CpuArch::Arm64);
        assert_eq!(CpuArch::from_name("armv7s"), CpuArch::Arm);
        assert_eq!(CpuArch::from_name("i386"), CpuArch::X86);
        assert_eq!(CpuArch::from_name("x86_64"), CpuArch::X86_64);
        assert_eq!(CpuArch::from_name("ppc"), CpuArch::Unknown);
    }

    #[test]
    fn test_register_orders() {
        let arm64 = CpuArch::Arm64.register_order();
        assert_eq!(arm64.len(), 34);
        // KSCrash names x29 `fp` and never reports an `x29` key, so there is
        // no `x29` slot. `lr` (x30) comes before `sp`, in register-file order.
        assert_eq!(arm64[28], "x28");
        assert!(!arm64.contains(&"x29"));
        assert_eq!(&arm64[29..], &["fp", "lr", "sp", "pc", "cpsr"]);
        assert_eq!(CpuArch::Unknown.register_order(), arm64);
        assert_eq!(CpuArch::X86.register_order()[10], "eip");
        assert_eq!(CpuArch::X86_64.register_order()[16], "rip");
    }

    #[test]
    fn test_device_name() {
        assert_eq!(device_name("iPhone10,3"), Some("iPhone X"));
        assert_eq!(device_name("iPad4,5"), Some("iPad mini 2G"));
        assert_eq!(device_name("iPhone99,1"), None);
    }

    #[test]
    fn test_platform() {
        assert_eq!(Platform::from_system_name(Some("macOS")), Platform::Desktop);
        assert_eq!(Platform::from_system_name(Some("iOS")), Platform::Mobile);
        assert_eq!(Platform::from_system_name(None), Platform::Mobile);
    }
}
