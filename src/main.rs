fn main() {
    pubwait_lib::run()
}
